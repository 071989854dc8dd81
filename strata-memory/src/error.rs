// Copyright 2026 strata Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use strata_common::error::{Error, ErrorKind};

use crate::helper::Object;

/// A failed insertion.
///
/// The cache never takes ownership of a rejected object. It is handed back with the error and the caller decides
/// what to do with it.
#[derive(thiserror::Error, Debug)]
#[error("{error}")]
pub struct InsertError {
    #[source]
    error: Error,
    object: Option<Object>,
}

impl InsertError {
    /// Create an insert error returning `object` to the caller.
    pub fn new(error: Error, object: Option<Object>) -> Self {
        Self { error, object }
    }

    /// The cause of the rejection.
    pub fn error(&self) -> &Error {
        &self.error
    }

    /// Kind of the cause.
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    /// Whether the insertion was rejected by the strict capacity limit.
    pub fn is_capacity_exceeded(&self) -> bool {
        self.error.is_capacity_exceeded()
    }

    /// Take the rejected object back.
    pub fn into_object(self) -> Option<Object> {
        self.object
    }

    /// Split into the cause and the rejected object.
    pub fn into_parts(self) -> (Error, Option<Object>) {
        (self.error, self.object)
    }
}

impl From<InsertError> for Error {
    fn from(e: InsertError) -> Self {
        e.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_error_returns_object() {
        let e = InsertError::new(Error::capacity_exceeded(10, 10, 1), Some(Box::new(7u32)));
        assert!(e.is_capacity_exceeded());
        assert_eq!(e.kind(), ErrorKind::CapacityExceeded);
        assert!(e.to_string().contains("strict capacity limit"));
        assert!(std::error::Error::source(&e).is_some());

        let object = e.into_object().unwrap();
        assert_eq!(object.downcast_ref::<u32>(), Some(&7));
    }
}
