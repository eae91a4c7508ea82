// Storyboard easing curves, by numeric id as they appear in command data.
// Unknown ids fall back to linear rather than erroring, so one bad command
// cannot take down playback of an otherwise fine chart.

use std::f32::consts::PI;

pub const EASING_COUNT: u8 = 35;

const ELASTIC_PERIOD: f32 = 0.3;
const BACK_OVERSHOOT: f32 = 1.70158;

#[inline(always)]
fn clamp01(t: f32) -> f32 {
    if t <= 0.0 {
        0.0
    } else if t >= 1.0 {
        1.0
    } else {
        t
    }
}

#[inline(always)]
fn quad_in(t: f32) -> f32 {
    t * t
}

#[inline(always)]
fn cubic_in(t: f32) -> f32 {
    t * t * t
}

#[inline(always)]
fn quart_in(t: f32) -> f32 {
    t * t * t * t
}

#[inline(always)]
fn quint_in(t: f32) -> f32 {
    t * t * t * t * t
}

#[inline(always)]
fn sine_in(t: f32) -> f32 {
    1.0 - (t * PI * 0.5).cos()
}

#[inline(always)]
fn expo_in(t: f32) -> f32 {
    2.0_f32.powf(10.0 * (t - 1.0))
}

#[inline(always)]
fn circ_in(t: f32) -> f32 {
    1.0 - (1.0 - t * t).max(0.0).sqrt()
}

#[inline(always)]
fn back_in(t: f32) -> f32 {
    t * t * ((BACK_OVERSHOOT + 1.0) * t - BACK_OVERSHOOT)
}

#[inline(always)]
fn elastic_out(t: f32) -> f32 {
    let p = ELASTIC_PERIOD;
    2.0_f32.powf(-10.0 * t) * ((t - p / 4.0) * (2.0 * PI) / p).sin() + 1.0
}

#[inline(always)]
fn elastic_half_out(t: f32) -> f32 {
    let p = ELASTIC_PERIOD;
    2.0_f32.powf(-10.0 * t) * ((0.5 * t - p / 4.0) * (2.0 * PI) / p).sin() + 1.0
}

#[inline(always)]
fn elastic_quarter_out(t: f32) -> f32 {
    let p = ELASTIC_PERIOD;
    2.0_f32.powf(-10.0 * t) * ((0.25 * t - p / 4.0) * (2.0 * PI) / p).sin() + 1.0
}

#[inline(always)]
fn bounce_out(t: f32) -> f32 {
    if t < 1.0 / 2.75 {
        7.5625 * t * t
    } else if t < 2.0 / 2.75 {
        let t = t - 1.5 / 2.75;
        7.5625 * t * t + 0.75
    } else if t < 2.5 / 2.75 {
        let t = t - 2.25 / 2.75;
        7.5625 * t * t + 0.9375
    } else {
        let t = t - 2.625 / 2.75;
        7.5625 * t * t + 0.984375
    }
}

#[inline(always)]
fn reverse(f: fn(f32) -> f32, t: f32) -> f32 {
    1.0 - f(1.0 - t)
}

#[inline(always)]
fn in_out(f: fn(f32) -> f32, t: f32) -> f32 {
    if t < 0.5 {
        0.5 * f(t * 2.0)
    } else {
        0.5 + 0.5 * reverse(f, t * 2.0 - 1.0)
    }
}

/// Evaluate easing curve `id` at normalized progress `t`.
///
/// `t` is clamped to [0,1] first; callers legitimately pass slightly
/// out-of-range values due to float division. Endpoints are exact for every
/// curve, including the overshooting ones (Back, Elastic).
pub fn ease(t: f32, id: u8) -> f32 {
    let t = clamp01(t);
    // Exact fixed points regardless of curve formula (Expo/Elastic closed
    // forms do not land exactly on 0/1 otherwise).
    if t == 0.0 {
        return 0.0;
    }
    if t == 1.0 {
        return 1.0;
    }

    match id {
        0 => t,
        1 => reverse(quad_in, t),
        2 => quad_in(t),
        3 => quad_in(t),
        4 => reverse(quad_in, t),
        5 => in_out(quad_in, t),
        6 => cubic_in(t),
        7 => reverse(cubic_in, t),
        8 => in_out(cubic_in, t),
        9 => quart_in(t),
        10 => reverse(quart_in, t),
        11 => in_out(quart_in, t),
        12 => quint_in(t),
        13 => reverse(quint_in, t),
        14 => in_out(quint_in, t),
        15 => sine_in(t),
        16 => reverse(sine_in, t),
        17 => in_out(sine_in, t),
        18 => expo_in(t),
        19 => reverse(expo_in, t),
        20 => in_out(expo_in, t),
        21 => circ_in(t),
        22 => reverse(circ_in, t),
        23 => in_out(circ_in, t),
        24 => reverse(elastic_out, t),
        25 => elastic_out(t),
        26 => elastic_half_out(t),
        27 => elastic_quarter_out(t),
        28 => {
            if t < 0.5 {
                0.5 * reverse(elastic_out, t * 2.0)
            } else {
                0.5 + 0.5 * elastic_out(t * 2.0 - 1.0)
            }
        }
        29 => back_in(t),
        30 => reverse(back_in, t),
        31 => in_out(back_in, t),
        32 => reverse(bounce_out, t),
        33 => bounce_out(t),
        34 => in_out(bounce_out, t),
        // Unknown easing: identity. Degraded input, not an error.
        _ => t,
    }
}

/// Interpolate `a..b` at progress `t` shaped by easing curve `id`.
#[inline(always)]
pub fn lerp(a: f32, b: f32, t: f32, id: u8) -> f32 {
    a + (b - a) * ease(t, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_exact_for_all_ids() {
        for id in 0..EASING_COUNT {
            assert_eq!(ease(0.0, id), 0.0, "ease(0) for id {id}");
            assert_eq!(ease(1.0, id), 1.0, "ease(1) for id {id}");
        }
    }

    #[test]
    fn out_of_range_progress_is_clamped() {
        for id in 0..EASING_COUNT {
            assert_eq!(ease(-0.25, id), 0.0);
            assert_eq!(ease(1.25, id), 1.0);
        }
    }

    #[test]
    fn unknown_id_is_linear() {
        assert_eq!(ease(0.3, 200), 0.3);
        assert_eq!(ease(0.75, 35), 0.75);
    }

    #[test]
    fn lerp_endpoints() {
        for id in 0..EASING_COUNT {
            assert_eq!(lerp(3.0, 9.0, 0.0, id), 3.0);
            assert_eq!(lerp(3.0, 9.0, 1.0, id), 9.0);
        }
    }

    #[test]
    fn linear_midpoint() {
        assert_eq!(lerp(0.0, 100.0, 0.5, 0), 50.0);
    }

    #[test]
    fn quad_in_is_accelerating() {
        assert!(ease(0.5, 2) < 0.5);
        assert!(ease(0.5, 4) > 0.5);
    }

    #[test]
    fn elastic_in_hugs_zero_early_and_out_leaves_immediately() {
        // The endpoint short-circuits cannot tell In from Out apart; the
        // shape just inside t=0 can. ElasticIn(0.05) ~ 0.0007, while
        // ElasticOut is already ~0.65 there.
        assert!(ease(0.05, 24).abs() < 0.05);
        assert!(ease(0.05, 25) > 0.3);
        // Time-reversal identity between the two curves.
        let t = 0.3;
        assert!((ease(t, 24) - (1.0 - ease(1.0 - t, 25))).abs() < 1e-5);
        // The In half of InOut hugs zero the same way.
        assert!(ease(0.05, 28).abs() < 0.05);
    }

    #[test]
    fn bounce_stays_in_range() {
        let mut t = 0.0;
        while t <= 1.0 {
            let v = ease(t, 33);
            assert!((0.0..=1.0).contains(&v), "bounce_out({t}) = {v}");
            t += 0.01;
        }
    }
}
