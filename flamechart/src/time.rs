// Copyright (C) 2025 Category Labs, Inc.
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

use crate::trace::Micros;

pub fn micros_to_ms(micros: Micros) -> f64 {
    micros as f64 / 1000.0
}

/// Human readable duration, in the precision a tooltip wants.
pub fn format_ms(ms: f64) -> String {
    if ms.is_nan() {
        return String::new();
    }
    if ms == 0.0 {
        return "0 ms".to_string();
    }
    if ms < 1.0 {
        return format!("{:.0} μs", ms * 1000.0);
    }
    if ms < 10.0 {
        return format!("{ms:.2} ms");
    }
    if ms < 100.0 {
        return format!("{ms:.1} ms");
    }
    if ms < 1000.0 {
        return format!("{ms:.0} ms");
    }
    format!("{:.2} s", ms / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, "0 ms")]
    #[case(0.25, "250 μs")]
    #[case(1.234, "1.23 ms")]
    #[case(12.34, "12.3 ms")]
    #[case(123.4, "123 ms")]
    #[case(1234.0, "1.23 s")]
    #[case(f64::NAN, "")]
    fn test_format_ms(#[case] ms: f64, #[case] expected: &str) {
        assert_eq!(format_ms(ms), expected);
    }
}
