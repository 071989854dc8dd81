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

/// Eviction hint of a cache entry.
///
/// The hint never affects correctness. Entries of a lower priority are evicted before entries of a higher priority,
/// and [`Priority::Bottom`] is reserved for the least critical content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Priority {
    /// Least likely to be kept.
    Bottom,
    /// The default priority.
    #[default]
    Low,
    /// Most likely to be kept.
    High,
}

impl Priority {
    /// All priorities, in eviction order.
    pub const EVICTION_ORDER: [Priority; 3] = [Priority::Bottom, Priority::Low, Priority::High];

    /// Index of the priority, `0` for the most disposable.
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Classification tag of a category of cached objects.
///
/// The cache never interprets the role. It is carried along with the helper of an entry so that callers can attribute
/// usage, e.g. in an [`apply_to_all_entries`] visitor.
///
/// [`apply_to_all_entries`]: https://docs.rs/strata-memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EntryRole {
    /// Data block.
    DataBlock,
    /// Filter block.
    FilterBlock,
    /// Metadata of a partitioned filter.
    FilterMetaBlock,
    /// Index block.
    IndexBlock,
    /// Any other kind of block.
    OtherBlock,
    /// Memory reserved for a write buffer.
    WriteBuffer,
    /// Memory reserved while building a compression dictionary.
    CompressionDictionaryBuildingBuffer,
    /// Memory reserved while constructing a filter.
    FilterConstruction,
    /// Table reader.
    TableReader,
    /// File metadata.
    FileMetadata,
    /// Blob value.
    BlobValue,
    /// Uncategorized.
    #[default]
    Misc,
}

impl EntryRole {
    /// Number of roles.
    pub const COUNT: usize = 12;

    /// Human readable name of the role.
    pub const fn name(self) -> &'static str {
        match self {
            EntryRole::DataBlock => "data-block",
            EntryRole::FilterBlock => "filter-block",
            EntryRole::FilterMetaBlock => "filter-meta-block",
            EntryRole::IndexBlock => "index-block",
            EntryRole::OtherBlock => "other-block",
            EntryRole::WriteBuffer => "write-buffer",
            EntryRole::CompressionDictionaryBuildingBuffer => "compression-dictionary-building-buffer",
            EntryRole::FilterConstruction => "filter-construction",
            EntryRole::TableReader => "table-reader",
            EntryRole::FileMetadata => "file-metadata",
            EntryRole::BlobValue => "blob-value",
            EntryRole::Misc => "misc",
        }
    }
}

impl std::fmt::Display for EntryRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
