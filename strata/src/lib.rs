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

//! strata - object cache with secondary tier support.
//!
//! See [`LruCache`] for the primary tier, [`SecondaryCache`] for the secondary tier boundary and
//! [`create_from_str`] to build a cache from an option string.

mod create;
/// A collection of the public types.
pub mod prelude;

pub use create::create_from_str;
pub use prelude::*;

/// Shared components.
pub use strata_common as common;
/// The primary tier and its secondary tier integration.
pub use strata_memory as memory;
