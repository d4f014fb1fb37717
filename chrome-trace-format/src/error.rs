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

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("unknown JSON format")]
    UnknownFormat,

    #[error("unbalanced brackets at byte {0}")]
    UnbalancedBrackets(usize),

    #[error("malformed trace data: {message}")]
    Malformed { message: String },

    #[error("legacy timeline format is not supported")]
    LegacyFormat,

    #[error("trace input is not valid UTF-8")]
    InvalidUtf8,

    #[error("failed to read trace: {0}")]
    Io(#[from] std::io::Error),

    #[error("loading cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for LoadError {
    fn from(err: serde_json::Error) -> Self {
        LoadError::Malformed {
            message: err.to_string(),
        }
    }
}
