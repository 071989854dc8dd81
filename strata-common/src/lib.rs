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

//! Shared components for strata.

/// Allocator boundary passed through to entry callbacks.
pub mod allocator;
/// Assertion utilities.
pub mod assert;
/// Error definitions.
pub mod error;
/// Entry level properties.
pub mod properties;
/// Scoped functional programming extensions.
pub mod scope;
/// Task spawner.
pub mod spawn;
/// Statistics sink for lookup counters.
pub mod statistics;
