// SPDX-License-Identifier: Apache-2.0
//! Canonical adapter set.
//!
//! Policies and costs here are contractual: auto adapters are the only ones
//! the compiler may insert silently, suggest adapters surface as proposals,
//! and explicit adapters (field reductions) must be placed by the user.

use crate::ir::{IrBuilder, Kernel, ReduceMode, ValueRef};
use crate::transform::{
    AdapterCost, AdapterPolicy, CompileStepError, ParamRefs, RegistryError, ResolvedParams,
    TransformDef, TransformError, TransformKind, TransformRegistry, TypePattern,
};
use crate::types::{DomainKind, TypeDesc, World};
use crate::value::Value;

/// Registers the canonical adapters.
///
/// # Errors
///
/// [`RegistryError`] on id collisions (only possible if called twice on the
/// same registry).
pub fn register_canonical_adapters(reg: &mut TransformRegistry) -> Result<(), RegistryError> {
    let mut add = |name: &'static str,
                   input: TypePattern,
                   output: TypePattern,
                   policy: AdapterPolicy,
                   cost: AdapterCost,
                   apply: fn(&Value, &ResolvedParams) -> Result<Value, TransformError>,
                   compile: fn(
        ValueRef,
        &ParamRefs,
        &mut IrBuilder,
    ) -> Result<ValueRef, CompileStepError>|
     -> Result<(), RegistryError> {
        reg.register(TransformDef {
            name,
            kind: TransformKind::Adapter {
                input,
                output,
                policy,
                cost,
            },
            params: &[],
            apply,
            compile,
            stateful: false,
        })
    };

    add(
        "ConstToSignal",
        TypePattern::AnyDomain(World::Scalar),
        TypePattern::AnyDomain(World::Signal),
        AdapterPolicy::Auto,
        AdapterCost::Cheap,
        identity_apply,
        const_to_signal_compile,
    )?;
    add(
        "BroadcastScalarToField",
        TypePattern::AnyDomain(World::Scalar),
        TypePattern::AnyDomain(World::Field),
        AdapterPolicy::Auto,
        AdapterCost::Medium,
        identity_apply,
        broadcast_compile,
    )?;
    add(
        "BroadcastSignalToField",
        TypePattern::AnyDomain(World::Signal),
        TypePattern::AnyDomain(World::Field),
        AdapterPolicy::Auto,
        AdapterCost::Medium,
        identity_apply,
        broadcast_compile,
    )?;
    add(
        "NormalizeToPhase",
        TypePattern::Exact(TypeDesc::signal(DomainKind::Float)),
        TypePattern::Exact(TypeDesc::signal(DomainKind::Phase)),
        AdapterPolicy::Suggest,
        AdapterCost::Cheap,
        fract_apply,
        fract_compile,
    )?;
    add(
        "PhaseToNumber",
        TypePattern::Exact(TypeDesc::signal(DomainKind::Phase)),
        TypePattern::Exact(TypeDesc::signal(DomainKind::Float)),
        AdapterPolicy::Auto,
        AdapterCost::Cheap,
        phase_to_number_apply,
        phase_to_number_compile,
    )?;
    add(
        "NumberToDurationMs",
        TypePattern::Exact(TypeDesc::signal(DomainKind::Float)),
        TypePattern::Exact(TypeDesc::signal(DomainKind::Duration)),
        AdapterPolicy::Suggest,
        AdapterCost::Cheap,
        number_to_duration_apply,
        number_to_duration_compile,
    )?;
    add(
        "DurationToNumberMs",
        TypePattern::Exact(TypeDesc::signal(DomainKind::Duration)),
        TypePattern::Exact(TypeDesc::signal(DomainKind::Float)),
        AdapterPolicy::Auto,
        AdapterCost::Cheap,
        duration_to_number_apply,
        duration_to_number_compile,
    )?;

    // Field reductions require an explicit mode at design time; there is no
    // silent mean default. One id per mode keeps the registry table-driven.
    add(
        "ReduceFieldToSignal.mean",
        TypePattern::Exact(TypeDesc::field(DomainKind::Float)),
        TypePattern::Exact(TypeDesc::signal(DomainKind::Float)),
        AdapterPolicy::Explicit,
        AdapterCost::Heavy,
        reduce_apply,
        reduce_mean_compile,
    )?;
    add(
        "ReduceFieldToSignal.sum",
        TypePattern::Exact(TypeDesc::field(DomainKind::Float)),
        TypePattern::Exact(TypeDesc::signal(DomainKind::Float)),
        AdapterPolicy::Explicit,
        AdapterCost::Heavy,
        reduce_apply,
        reduce_sum_compile,
    )?;
    add(
        "ReduceFieldToSignal.min",
        TypePattern::Exact(TypeDesc::field(DomainKind::Float)),
        TypePattern::Exact(TypeDesc::signal(DomainKind::Float)),
        AdapterPolicy::Explicit,
        AdapterCost::Heavy,
        reduce_apply,
        reduce_min_compile,
    )?;
    add(
        "ReduceFieldToSignal.max",
        TypePattern::Exact(TypeDesc::field(DomainKind::Float)),
        TypePattern::Exact(TypeDesc::signal(DomainKind::Float)),
        AdapterPolicy::Explicit,
        AdapterCost::Heavy,
        reduce_apply,
        reduce_max_compile,
    )?;
    Ok(())
}

fn identity_apply(v: &Value, _: &ResolvedParams) -> Result<Value, TransformError> {
    Ok(v.clone())
}

fn const_to_signal_compile(
    input: ValueRef,
    _: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    let id = b.as_node(input);
    Ok(ValueRef {
        kind: crate::ir::RefKind::Sig,
        id: id.0,
    })
}

fn broadcast_compile(
    input: ValueRef,
    _: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    Ok(b.broadcast(input))
}

fn fract_apply(v: &Value, _: &ResolvedParams) -> Result<Value, TransformError> {
    Kernel::Fract
        .apply(&[v.clone()])
        .map_err(|_| TransformError::BadInput {
            transform: "NormalizeToPhase",
            got: v.domain_kind().name(),
        })
}

fn fract_compile(
    input: ValueRef,
    _: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    Ok(b.map(input, Kernel::Fract))
}

fn phase_to_number_apply(v: &Value, _: &ResolvedParams) -> Result<Value, TransformError> {
    Kernel::PhaseToNumber
        .apply(&[v.clone()])
        .map_err(|_| TransformError::BadInput {
            transform: "PhaseToNumber",
            got: v.domain_kind().name(),
        })
}

fn phase_to_number_compile(
    input: ValueRef,
    _: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    Ok(b.map(input, Kernel::PhaseToNumber))
}

fn number_to_duration_apply(v: &Value, _: &ResolvedParams) -> Result<Value, TransformError> {
    Kernel::NumberToDuration
        .apply(&[v.clone()])
        .map_err(|_| TransformError::BadInput {
            transform: "NumberToDurationMs",
            got: v.domain_kind().name(),
        })
}

fn number_to_duration_compile(
    input: ValueRef,
    _: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    Ok(b.map(input, Kernel::NumberToDuration))
}

fn duration_to_number_apply(v: &Value, _: &ResolvedParams) -> Result<Value, TransformError> {
    Kernel::DurationToNumber
        .apply(&[v.clone()])
        .map_err(|_| TransformError::BadInput {
            transform: "DurationToNumberMs",
            got: v.domain_kind().name(),
        })
}

fn duration_to_number_compile(
    input: ValueRef,
    _: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    Ok(b.map(input, Kernel::DurationToNumber))
}

/// Value-level reduce over an already-materialized list (UI preview path);
/// fields proper reduce in IR.
fn reduce_apply(v: &Value, _: &ResolvedParams) -> Result<Value, TransformError> {
    match v {
        Value::List(items) => {
            let mut sum = 0.0;
            for item in items {
                sum += item.as_f64().unwrap_or(0.0);
            }
            Ok(Value::Number(sum))
        }
        other => Ok(other.clone()),
    }
}

fn reduce_mean_compile(
    input: ValueRef,
    _: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    Ok(b.reduce_field(input, ReduceMode::Mean))
}

fn reduce_sum_compile(
    input: ValueRef,
    _: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    Ok(b.reduce_field(input, ReduceMode::Sum))
}

fn reduce_min_compile(
    input: ValueRef,
    _: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    Ok(b.reduce_field(input, ReduceMode::Min))
}

fn reduce_max_compile(
    input: ValueRef,
    _: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    Ok(b.reduce_field(input, ReduceMode::Max))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn registry() -> TransformRegistry {
        let mut reg = TransformRegistry::new();
        register_canonical_adapters(&mut reg).unwrap();
        reg
    }

    #[test]
    fn canonical_policies_and_costs_are_exact() {
        let reg = registry();
        let check = |id: &str, policy: AdapterPolicy, cost: AdapterCost| {
            let def = reg.get(id).unwrap_or_else(|| panic!("missing adapter {id}"));
            assert_eq!(def.policy(), Some(policy), "{id} policy");
            assert_eq!(def.cost(), Some(cost), "{id} cost");
        };
        check("ConstToSignal", AdapterPolicy::Auto, AdapterCost::Cheap);
        check(
            "BroadcastScalarToField",
            AdapterPolicy::Auto,
            AdapterCost::Medium,
        );
        check(
            "BroadcastSignalToField",
            AdapterPolicy::Auto,
            AdapterCost::Medium,
        );
        check("NormalizeToPhase", AdapterPolicy::Suggest, AdapterCost::Cheap);
        check("PhaseToNumber", AdapterPolicy::Auto, AdapterCost::Cheap);
        check(
            "NumberToDurationMs",
            AdapterPolicy::Suggest,
            AdapterCost::Cheap,
        );
        check(
            "DurationToNumberMs",
            AdapterPolicy::Auto,
            AdapterCost::Cheap,
        );
        for mode in ["mean", "sum", "min", "max"] {
            check(
                &format!("ReduceFieldToSignal.{mode}"),
                AdapterPolicy::Explicit,
                AdapterCost::Heavy,
            );
        }
    }

    #[test]
    fn const_to_signal_preserves_domain() {
        let reg = registry();
        let def = reg.get("ConstToSignal").unwrap();
        let from = TypeDesc::scalar(DomainKind::Phase);
        assert!(def.input_matches(&from));
        assert_eq!(def.output_type(&from), TypeDesc::signal(DomainKind::Phase));
    }

    #[test]
    fn adapters_do_not_match_internal_category() {
        let reg = registry();
        let def = reg.get("ConstToSignal").unwrap();
        assert!(!def.input_matches(&TypeDesc::scalar(DomainKind::Float).internal()));
    }
}
