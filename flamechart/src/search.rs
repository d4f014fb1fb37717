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

use crate::error::Result;
use crate::trace::TraceEvent;
use regex::{Regex, RegexBuilder};

/// Decides whether an event matches a search.
pub trait SearchFilter {
    fn accept(&self, event: &TraceEvent) -> bool;
}

impl<F> SearchFilter for F
where
    F: Fn(&TraceEvent) -> bool,
{
    fn accept(&self, event: &TraceEvent) -> bool {
        self(event)
    }
}

/// Case-insensitive match against an event's name, function name and URL.
#[derive(Debug, Clone)]
pub struct TextFilter {
    regex: Regex,
}

impl TextFilter {
    /// Matches `text` literally.
    pub fn new(text: &str) -> Result<Self> {
        Self::from_pattern(&regex::escape(text))
    }

    pub fn from_pattern(pattern: &str) -> Result<Self> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self { regex })
    }
}

impl SearchFilter for TextFilter {
    fn accept(&self, event: &TraceEvent) -> bool {
        if self.regex.is_match(&event.name) {
            return true;
        }
        if let Some(call) = event.profile_call() {
            return self.regex.is_match(&call.function_name) || self.regex.is_match(&call.url);
        }
        if let Some(request) = event.network_request() {
            return self.regex.is_match(&request.url);
        }
        event
            .data()
            .and_then(|data| data.get("url"))
            .and_then(|url| url.as_str())
            .is_some_and(|url| self.regex.is_match(url))
    }
}
