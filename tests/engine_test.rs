//! Box state engine behavior tests.

use boxflow::catalog::InstrumentConfig;
use boxflow::engine::BoxStateEngine;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn eur_usd() -> InstrumentConfig {
    InstrumentConfig::new(dec!(0.0001), vec![1, 2]).unwrap()
}

/// The concrete scenario from the design review: pointSize 0.0001,
/// boxSizes [1, 2], initialized at 1.1000, candle {high 1.1050, low 1.0995}.
#[test]
fn upward_extension_across_both_scales() {
    let mut engine = BoxStateEngine::new(eur_usd(), dec!(1.1000));
    engine.update(dec!(1.1050), dec!(1.0995));

    let snapshot = engine.snapshot();

    assert_eq!(snapshot[0].high, dec!(1.1050));
    assert_eq!(snapshot[0].low, dec!(1.1049));
    assert_eq!(snapshot[0].value, dec!(0.0001));

    assert_eq!(snapshot[1].high, dec!(1.1050));
    assert_eq!(snapshot[1].low, dec!(1.1048));
    assert_eq!(snapshot[1].value, dec!(0.0002));
}

#[test]
fn boundary_invariant_holds_through_arbitrary_updates() {
    let config = InstrumentConfig::new(dec!(0.0001), vec![1, 3, 10, 50]).unwrap();
    let mut engine = BoxStateEngine::new(config.clone(), dec!(1.2500));

    let candles = [
        (dec!(1.2510), dec!(1.2490)),
        (dec!(1.2495), dec!(1.2440)),
        (dec!(1.2600), dec!(1.2430)),
        (dec!(1.2601), dec!(1.2599)),
        (dec!(1.2300), dec!(1.2100)),
    ];

    for (high, low) in candles {
        engine.update(high, low);
        for (entry, &size) in engine.snapshot().iter().zip(config.box_sizes()) {
            assert_eq!(
                entry.high - entry.low,
                config.magnitude(size),
                "boundary invariant violated for box size {size}"
            );
            assert_eq!(entry.value.abs(), config.magnitude(size));
        }
    }
}

#[test]
fn candle_inside_range_is_a_noop() {
    let mut engine = BoxStateEngine::new(eur_usd(), dec!(1.1000));
    let before = engine.snapshot();

    // Within [low, high] for every scale.
    engine.update(dec!(1.09995), dec!(1.0999));

    assert_eq!(engine.snapshot(), before);
}

#[test]
fn downward_break_flips_to_down_state() {
    // Initialized at P in the up-state; a candle with low < P - 2*magnitude
    // flips the scale negative with low at the candle's low.
    let config = InstrumentConfig::new(dec!(0.0001), vec![3]).unwrap();
    let magnitude = config.magnitude(3);
    let reference = dec!(1.1000);
    let mut engine = BoxStateEngine::new(config, reference);

    let candle_low = reference - magnitude * Decimal::from(2) - dec!(0.0001);
    engine.update(reference - dec!(0.0001), candle_low);

    let entry = engine.snapshot()[0];
    assert_eq!(entry.low, candle_low);
    assert_eq!(entry.high, candle_low + magnitude);
    assert_eq!(entry.value, -magnitude);
}

#[test]
fn new_high_flips_down_state_back_up() {
    let mut engine = BoxStateEngine::new(eur_usd(), dec!(1.1000));

    engine.update(dec!(1.0999), dec!(1.0900));
    assert!(engine.snapshot()[0].value.is_sign_negative());

    engine.update(dec!(1.1100), dec!(1.0950));
    let entry = engine.snapshot()[0];
    assert_eq!(entry.high, dec!(1.1100));
    assert_eq!(entry.low, dec!(1.1099));
    assert_eq!(entry.value, dec!(0.0001));
}

#[test]
fn scales_update_independently() {
    // A small down-move flips the tight scale but stays inside the wide one.
    let config = InstrumentConfig::new(dec!(0.0001), vec![1, 100]).unwrap();
    let mut engine = BoxStateEngine::new(config, dec!(1.1000));
    let before_wide = engine.snapshot()[1];

    engine.update(dec!(1.0998), dec!(1.0995));

    let snapshot = engine.snapshot();
    assert_eq!(snapshot[0].low, dec!(1.0995));
    assert_eq!(snapshot[0].value, dec!(-0.0001));
    assert_eq!(snapshot[1], before_wide);
}
