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

use std::{any::Any, fmt::Debug};

use bytes::{Bytes, BytesMut};
use strata_common::{
    allocator::MemoryAllocator,
    error::{Error, ErrorKind, Result},
    properties::EntryRole,
};

/// A cached object of a type the cache knows nothing about.
pub type Object = Box<dyn Any + Send + Sync>;

/// Borrowed view of a cached object.
pub type ObjectRef<'a> = &'a (dyn Any + Send + Sync);

/// Caller supplied context handed to [`CreateFn`] when an object is rebuilt.
pub type CreateContext = dyn Any + Send + Sync;

/// Destroys an object. Invoked exactly once per object the cache owns.
pub type DeleterFn = fn(Object, Option<&dyn MemoryAllocator>);

/// Size in bytes of the serialized form of an object.
pub type SizeFn = fn(ObjectRef<'_>) -> usize;

/// Writes `out.len()` bytes of the serialized form of an object, starting at `offset`.
///
/// May be called several times with increasing offsets.
pub type SaveToFn = fn(ObjectRef<'_>, usize, &mut [u8]) -> Result<()>;

/// Rebuilds an object from its serialized form, returning the object and its charge.
pub type CreateFn = fn(&[u8], Option<&CreateContext>, Option<&dyn MemoryAllocator>) -> Result<(Object, usize)>;

/// Serialization works in chunks of this size, so that a single `save_to` call never sees huge buffers.
const SAVE_TO_CHUNK: usize = 64 * 1024;

/// The set of stateless callbacks that manage one category of cached objects.
///
/// Helpers are referenced by every entry they govern and must outlive the cache, which is why the cache takes them as
/// `&'static`. Define them as statics:
///
/// ```rust
/// # use strata_common::{allocator::MemoryAllocator, error::Result, properties::EntryRole};
/// # use strata_memory::{EntryHelper, Object, ObjectRef, CreateContext};
/// fn size(obj: ObjectRef<'_>) -> usize {
///     obj.downcast_ref::<Vec<u8>>().map(|v| v.len()).unwrap_or_default()
/// }
/// fn save_to(obj: ObjectRef<'_>, offset: usize, out: &mut [u8]) -> Result<()> {
///     let v = obj.downcast_ref::<Vec<u8>>().unwrap();
///     out.copy_from_slice(&v[offset..offset + out.len()]);
///     Ok(())
/// }
/// fn create(data: &[u8], _: Option<&CreateContext>, _: Option<&dyn MemoryAllocator>) -> Result<(Object, usize)> {
///     Ok((Box::new(data.to_vec()), data.len()))
/// }
///
/// static BLOCK: EntryHelper = EntryHelper::new(EntryRole::DataBlock);
/// static BLOCK_WITH_SECONDARY: EntryHelper =
///     EntryHelper::with_secondary(EntryRole::DataBlock, None, size, save_to, create, &BLOCK);
///
/// assert!(BLOCK_WITH_SECONDARY.is_secondary_compatible());
/// assert!(!BLOCK_WITH_SECONDARY.without_secondary_compat().is_secondary_compatible());
/// ```
#[derive(Clone, Copy)]
pub struct EntryHelper {
    role: EntryRole,
    del_cb: Option<DeleterFn>,
    size_cb: Option<SizeFn>,
    saveto_cb: Option<SaveToFn>,
    create_cb: Option<CreateFn>,
    without_secondary_compat: Option<&'static EntryHelper>,
}

impl Debug for EntryHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryHelper")
            .field("role", &self.role)
            .field("deleter", &self.del_cb.is_some())
            .field("secondary", &self.is_secondary_compatible())
            .finish()
    }
}

/// A helper whose objects are simply dropped and never reach the secondary tier.
pub static NOOP_HELPER: EntryHelper = EntryHelper::new(EntryRole::Misc);

impl EntryHelper {
    /// A helper that drops objects normally and has no secondary tier support.
    pub const fn new(role: EntryRole) -> Self {
        Self {
            role,
            del_cb: None,
            size_cb: None,
            saveto_cb: None,
            create_cb: None,
            without_secondary_compat: None,
        }
    }

    /// A helper that destroys objects with `del_cb` and has no secondary tier support.
    pub const fn with_deleter(role: EntryRole, del_cb: DeleterFn) -> Self {
        Self {
            del_cb: Some(del_cb),
            ..Self::new(role)
        }
    }

    /// A helper that supports the secondary tier.
    ///
    /// `without_secondary_compat` is the variant used for entries whose serialized form is already held by the
    /// secondary tier. It must carry the same role and must not support the secondary tier itself. Both conditions are
    /// checked when the helper is built, which for a static means at compile time.
    pub const fn with_secondary(
        role: EntryRole,
        del_cb: Option<DeleterFn>,
        size_cb: SizeFn,
        saveto_cb: SaveToFn,
        create_cb: CreateFn,
        without_secondary_compat: &'static EntryHelper,
    ) -> Self {
        assert!(
            without_secondary_compat.role as u8 == role as u8,
            "the secondary incompatible variant must carry the same role"
        );
        assert!(
            !without_secondary_compat.is_secondary_compatible(),
            "the secondary incompatible variant must not have secondary callbacks"
        );
        Self {
            role,
            del_cb,
            size_cb: Some(size_cb),
            saveto_cb: Some(saveto_cb),
            create_cb: Some(create_cb),
            without_secondary_compat: Some(without_secondary_compat),
        }
    }

    /// Classification tag of the objects.
    pub const fn role(&self) -> EntryRole {
        self.role
    }

    /// Whether objects can be serialized to and rebuilt from the secondary tier.
    pub const fn is_secondary_compatible(&self) -> bool {
        self.size_cb.is_some()
    }

    /// The variant of this helper without secondary tier support, `self` if it has none.
    pub fn without_secondary_compat(&'static self) -> &'static EntryHelper {
        self.without_secondary_compat.unwrap_or(self)
    }

    /// Destroy `object` with the deleter, or drop it if there is none.
    pub fn destroy(&self, object: Object, allocator: Option<&dyn MemoryAllocator>) {
        match self.del_cb {
            Some(del) => del(object, allocator),
            None => drop(object),
        }
    }

    /// Size of the serialized form of `object`, `None` without secondary tier support.
    pub fn size(&self, object: ObjectRef<'_>) -> Option<usize> {
        self.size_cb.map(|size| size(object))
    }

    /// Serialize `object` chunk by chunk.
    pub fn serialize(&self, object: ObjectRef<'_>) -> Result<Bytes> {
        let (Some(size), Some(save_to)) = (self.size_cb, self.saveto_cb) else {
            return Err(Error::new(ErrorKind::Unsupported, "helper cannot serialize").with_context("role", self.role));
        };
        let len = size(object);
        let mut buf = BytesMut::zeroed(len);
        let mut offset = 0;
        while offset < len {
            let end = (offset + SAVE_TO_CHUNK).min(len);
            save_to(object, offset, &mut buf[offset..end])?;
            offset = end;
        }
        Ok(buf.freeze())
    }

    /// Rebuild an object from its serialized form.
    pub fn create(
        &self,
        data: &[u8],
        context: Option<&CreateContext>,
        allocator: Option<&dyn MemoryAllocator>,
    ) -> Result<(Object, usize)> {
        match self.create_cb {
            Some(create) => create(data, context, allocator),
            None => Err(Error::new(ErrorKind::Unsupported, "helper cannot create").with_context("role", self.role)),
        }
    }
}
