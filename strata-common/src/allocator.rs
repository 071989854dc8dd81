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

use std::fmt::Debug;

/// An opaque allocator handle.
///
/// The cache never allocates through it. It is only handed to the destroy and create callbacks of entry helpers, so
/// that callers can pair custom allocation with custom deallocation.
pub trait MemoryAllocator: Send + Sync + Debug + 'static {
    /// Name of the allocator.
    fn name(&self) -> &str;

    /// The size actually reserved for a request of `size` bytes.
    fn usable_size(&self, size: usize) -> usize {
        size
    }
}
