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
pub enum Error {
    #[error("malformed event key {0:?}")]
    MalformedKey(String),

    #[error("no event matches key {0}")]
    NoEventForKey(String),

    #[error("no profile call matches key {0}")]
    NoProfileCall(String),

    #[error("entry index {0} is out of range")]
    EntryIndexOutOfRange(usize),

    #[error("no timeline data has been built")]
    NoTimelineData,

    #[error("invalid search pattern: {0}")]
    SearchPattern(#[from] regex::Error),

    #[error("invalid persisted modifications: {0}")]
    PersistedState(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
