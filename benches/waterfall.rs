//! Benchmarks for the activity waterfall and consistency checking.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use akh_decide::activity::{Activation, ActivationClass};
use akh_decide::config::DecideConfig;
use akh_decide::decide::{ActiveLevelState, Decider};
use akh_decide::preference::Preference;
use akh_decide::semantics::IndifferentSelection;

/// A tie at the top followed by `depth - 1` levels of no-change sub-goals.
fn deep_stack(depth: usize) -> Decider {
    let mut d = Decider::from_config(&DecideConfig {
        indifferent_selection: IndifferentSelection::First,
        ..Default::default()
    });
    let top = d.create_top_goal().unwrap();
    for name in ["O1", "O2", "O3"] {
        let op = d.symbols_mut().intern(name).unwrap();
        d.stack_mut()
            .add_preference(top, Preference::acceptable(op))
            .unwrap();
    }
    d.decide_operator(top).unwrap();
    while d.stack().depth() < depth {
        let bottom = d.stack().bottom().unwrap();
        d.decide_operator(bottom).unwrap();
    }
    d
}

fn bench_waterfall_same_level(c: &mut Criterion) {
    let mut d = deep_stack(16);
    let bottom = d.stack().bottom().unwrap();
    d.stack_mut()
        .enqueue(bottom, ActivationClass::InferenceAssertion, Activation::new("elab*deep"))
        .unwrap();
    let mut state = ActiveLevelState::new();

    c.bench_function("waterfall_apply_depth16", |bench| {
        bench.iter(|| black_box(d.run_waterfall_apply(&mut state).unwrap()))
    });
}

fn bench_waterfall_level_bounce(c: &mut Criterion) {
    let mut d = deep_stack(16);
    let top = d.stack().top().unwrap();
    let bottom = d.stack().bottom().unwrap();
    d.stack_mut()
        .enqueue(bottom, ActivationClass::OutputAssertion, Activation::new("apply*deep"))
        .unwrap();
    let mut state = ActiveLevelState::new();

    c.bench_function("waterfall_higher_then_lower", |bench| {
        bench.iter(|| {
            d.stack_mut()
                .enqueue(top, ActivationClass::InferenceAssertion, Activation::new("elab*top"))
                .unwrap();
            black_box(d.run_waterfall_apply(&mut state).unwrap());
            d.stack_mut()
                .goal_mut(top)
                .unwrap()
                .pending_mut()
                .pop(ActivationClass::InferenceAssertion);
            black_box(d.run_waterfall_apply(&mut state).unwrap())
        })
    });
}

fn bench_check_stack(c: &mut Criterion) {
    let mut d = deep_stack(32);
    let top = d.stack().top().unwrap();
    let bottom = d.stack().bottom().unwrap();
    let extra = d.symbols_mut().intern("O4").unwrap();

    c.bench_function("check_stack_depth32", |bench| {
        bench.iter(|| {
            // A new acceptable keeps the tie but marks the slot changed.
            let id = d
                .stack_mut()
                .add_preference(top, Preference::acceptable(extra))
                .unwrap();
            let consistent = d.check_stack_through_goal(bottom).unwrap();
            d.stack_mut().remove_preference(top, id).unwrap();
            black_box(consistent)
        })
    });
}

criterion_group!(
    benches,
    bench_waterfall_same_level,
    bench_waterfall_level_bounce,
    bench_check_stack
);
criterion_main!(benches);
