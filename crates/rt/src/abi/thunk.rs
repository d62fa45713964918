//! Ties lowering, the actual core call, and lifting together into the single
//! operation a caller sees: "call this component function with these
//! values, get these values back." Captures its call context as plain
//! arguments rather than smuggling it through the callee's own argument
//! list (no `argv[0]`-style convention) — callers always get an ordinary
//! `Vec<Val>` in and out.

use super::{lift, lower};
use crate::core_iface::CoreEngine;
use crate::instance::Env;
use crate::item::FuncValue;
use crate::values::Val;
use std::collections::HashMap;
use weave_ir::TypeIndex;

pub fn call_func(env: &Env, func: &FuncValue, args: &[Val]) -> anyhow::Result<Vec<Val>> {
    match func {
        FuncValue::Host(host) => host.call(args),
        FuncValue::Lifted { core_func, ty, options } => {
            let param_tys: Vec<_> = ty.params.iter().map(|(_, t)| t.clone()).collect();
            let result_tys: Vec<_> = ty.results.iter().map(|(_, t)| t.clone()).collect();

            let flat_args = lower::lower_params(
                env,
                options.memory,
                options.realloc,
                options.string_encoding,
                args,
                &param_tys,
            )?;

            let call_result = env.core_engine.borrow_mut().call_wasm(*core_func, &flat_args);

            // `borrow<T>` handles this call received are only ever valid for
            // the duration of this call frame, whether it traps, returns
            // normally, or its results fail to lift — release them on every
            // exit path, not just the success one.
            release_call_frame_borrows(env, args);

            let raw_results = call_result?;
            let results = lift::lift_results(env, options.memory, options.string_encoding, &raw_results, &result_tys)?;

            if let Some(post_return) = options.post_return {
                env.core_engine.borrow_mut().call_wasm(post_return, &raw_results)?;
            }

            Ok(results)
        }
    }
}

/// Walk `args` for any `Val::Borrow` handles and end their call frame in the
/// resource table for their type, per the Component Model rule that a
/// `borrow` handle never outlives the call that received it (§4.7, §9).
fn release_call_frame_borrows(env: &Env, args: &[Val]) {
    let mut by_type: HashMap<TypeIndex, Vec<u32>> = HashMap::new();
    for a in args {
        collect_borrows(a, &mut by_type);
    }
    for (ty, handles) in by_type {
        env.resources.end_call_frame(ty, &handles);
    }
}

fn collect_borrows(v: &Val, out: &mut HashMap<TypeIndex, Vec<u32>>) {
    match v {
        Val::Borrow(h) => out.entry(h.ty).or_default().push(h.index),
        Val::List(items) | Val::Record(items) | Val::Tuple(items) => {
            for i in items {
                collect_borrows(i, out);
            }
        }
        Val::Variant { payload, .. } | Val::Option(payload) => {
            if let Some(p) = payload {
                collect_borrows(p, out);
            }
        }
        Val::Result(r) => match r {
            Ok(p) | Err(p) => {
                if let Some(p) = p {
                    collect_borrows(p, out);
                }
            }
        },
        _ => {}
    }
}
