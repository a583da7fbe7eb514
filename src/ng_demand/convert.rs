// ng_demand - Natural gas demand index from api.weather.gov forecasts
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

/// Convert a temperature in degrees fahrenheit (as returned by the forecast API) to celsius.
pub fn f_to_c(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

/// Convert a temperature in degrees celsius to fahrenheit.
pub fn c_to_f(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

/// Round `value` to the given number of decimal places for display or export.
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::{c_to_f, f_to_c, round_to};

    #[test]
    fn test_f_to_c_reference_points() {
        assert_eq!(0.0, f_to_c(32.0));
        assert_eq!(100.0, f_to_c(212.0));
        assert_eq!(-40.0, f_to_c(-40.0));
    }

    #[test]
    fn test_round_trip_within_tolerance() {
        let mut t = -60.0;
        while t <= 60.0 {
            assert!((f_to_c(c_to_f(t)) - t).abs() < 1e-9, "round trip failed for {}", t);
            t += 0.25;
        }
    }

    #[test]
    fn test_round_trip_after_rounding() {
        for f in -40..=120 {
            let c = round_to(f_to_c(f as f64), 2);
            assert!((c_to_f(c) - f as f64).abs() < 0.01);
        }
    }

    #[test]
    fn test_round_to() {
        assert_eq!(21.1, round_to(f_to_c(70.0), 1));
        assert_eq!(21.11, round_to(f_to_c(70.0), 2));
        assert_eq!(-5.0, round_to(-4.999, 2));
    }
}
