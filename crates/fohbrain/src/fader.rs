//! Console fader curve math.
//!
//! The console maps fader position (0.0-1.0) to send gain in dB along a
//! piecewise-linear approximation of its log taper. Breakpoints:
//!
//! - 1.0    -> +10 dB
//! - 0.75   ->   0 dB (unity)
//! - 0.5    -> -10 dB
//! - 0.25   -> -30 dB
//! - 0.0625 -> -60 dB
//! - below  -> -90 dB (treated as off)
//!
//! Setpoints are configured in dB; commands go out as fader positions, so
//! every controller funnels through these conversions.

/// Gain floor reported for faders at or below the bottom breakpoint.
pub const FADER_FLOOR_DB: f64 = -90.0;

/// Convert a fader position (0.0-1.0) to dB.
pub fn fader_to_db(fader: f64) -> f64 {
    if fader >= 0.5 {
        fader * 40.0 - 30.0
    } else if fader >= 0.25 {
        fader * 80.0 - 50.0
    } else if fader > 0.0625 {
        fader * 160.0 - 70.0
    } else {
        FADER_FLOOR_DB
    }
}

/// Convert dB to a fader position, clamped to the valid 0.0-1.0 range.
pub fn db_to_fader(db: f64) -> f64 {
    let fader = if db >= -10.0 {
        (db + 30.0) / 40.0
    } else if db >= -30.0 {
        (db + 50.0) / 80.0
    } else if db >= -60.0 {
        (db + 70.0) / 160.0
    } else {
        0.0
    };
    fader.clamp(0.0, 1.0)
}

/// Shift a fader position by a dB offset, staying on the console's curve.
pub fn apply_db_offset(fader: f64, offset_db: f64) -> f64 {
    db_to_fader(fader_to_db(fader) + offset_db)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_breakpoints() {
        assert!(close(fader_to_db(1.0), 10.0));
        assert!(close(fader_to_db(0.75), 0.0));
        assert!(close(fader_to_db(0.5), -10.0));
        assert!(close(fader_to_db(0.25), -30.0));
        assert!(close(fader_to_db(0.0), FADER_FLOOR_DB));
        // 0.0625 is inside the floor segment
        assert!(close(fader_to_db(0.0625), FADER_FLOOR_DB));
    }

    #[test]
    fn test_db_to_fader_breakpoints() {
        assert!(close(db_to_fader(10.0), 1.0));
        assert!(close(db_to_fader(0.0), 0.75));
        assert!(close(db_to_fader(-10.0), 0.5));
        assert!(close(db_to_fader(-30.0), 0.25));
        assert!(close(db_to_fader(-60.0), 0.0625));
        assert!(close(db_to_fader(-90.0), 0.0));
    }

    #[test]
    fn test_round_trip_above_floor() {
        for fader in [0.1, 0.25, 0.4, 0.5, 0.6, 0.75, 0.9, 1.0] {
            let db = fader_to_db(fader);
            assert!(
                close(db_to_fader(db), fader),
                "round trip failed at fader {}",
                fader
            );
        }
    }

    #[test]
    fn test_clamps_to_valid_range() {
        assert!(close(db_to_fader(25.0), 1.0));
        assert!(close(db_to_fader(-120.0), 0.0));
    }

    #[test]
    fn test_apply_db_offset() {
        // Unity +3 dB: (3 + 30) / 40 = 0.825
        assert!(close(apply_db_offset(0.75, 3.0), 0.825));
        // Unity -4 dB duck: (-4 + 30) / 40 = 0.65
        assert!(close(apply_db_offset(0.75, -4.0), 0.65));
        // Offsets cannot push past the top of the fader
        assert!(close(apply_db_offset(1.0, 6.0), 1.0));
    }

    #[test]
    fn test_monotonic() {
        let mut prev = fader_to_db(0.07);
        let mut fader = 0.08;
        while fader <= 1.0 {
            let db = fader_to_db(fader);
            assert!(db >= prev, "curve not monotonic at {}", fader);
            prev = db;
            fader += 0.01;
        }
    }
}
