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

use std::cell::RefCell;
use std::collections::HashMap;

/// Deterministic color assignment: the same id always maps to the same color,
/// across rebuilds and across runs.
#[derive(Debug)]
pub struct ColorGenerator {
    hue: (f64, f64),
    saturation: (f64, f64),
    lightness: (f64, f64),
    alpha: f64,
    cache: RefCell<HashMap<String, String>>,
}

impl ColorGenerator {
    pub fn new(hue: (f64, f64), saturation: (f64, f64), lightness: (f64, f64), alpha: f64) -> Self {
        Self {
            hue,
            saturation,
            lightness,
            alpha,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Palette for JavaScript frames and user timings.
    pub fn for_scripts() -> Self {
        Self::new((30.0, 55.0), (70.0, 100.0), (60.0, 70.0), 0.7)
    }

    /// Palette spread over the whole hue circle.
    pub fn wide() -> Self {
        Self::new((0.0, 360.0), (50.0, 80.0), (70.0, 80.0), 0.7)
    }

    pub fn color_for_id(&self, id: &str) -> String {
        if let Some(color) = self.cache.borrow().get(id) {
            return color.clone();
        }
        let color = self.generate(id);
        self.cache.borrow_mut().insert(id.to_string(), color.clone());
        color
    }

    fn generate(&self, id: &str) -> String {
        let hash = string_hash(id);
        let h = index_in_range(hash, self.hue);
        let s = index_in_range(hash >> 8, self.saturation);
        let l = index_in_range(hash >> 16, self.lightness);
        format!("hsl({h:.0} {s:.0}% {l:.0}% / {:.2})", self.alpha)
    }
}

fn index_in_range(hash: u32, (min, max): (f64, f64)) -> f64 {
    if max <= min {
        return min;
    }
    let span = (max - min) as u32 + 1;
    min + (hash % span) as f64
}

/// 31-multiplier string hash; stable across platforms and compiler versions.
pub fn string_hash(value: &str) -> u32 {
    value
        .chars()
        .fold(0u32, |hash, c| hash.wrapping_mul(31).wrapping_add(c as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_same_id_same_color() {
        let generator = ColorGenerator::for_scripts();
        let first = generator.color_for_id("app.js");
        let again = ColorGenerator::for_scripts().color_for_id("app.js");
        assert_eq!(first, again);
    }

    #[rstest]
    fn test_hue_stays_in_range() {
        let generator = ColorGenerator::new((30.0, 40.0), (50.0, 50.0), (60.0, 60.0), 1.0);
        for id in ["a", "bb", "ccc", "dddd", "some/long/url.js"] {
            let color = generator.color_for_id(id);
            let hue: f64 = color[4..].split(' ').next().unwrap().parse().unwrap();
            assert!((30.0..=40.0).contains(&hue), "{color}");
            assert!(color.contains(" 50% 60% "), "{color}");
        }
    }
}
