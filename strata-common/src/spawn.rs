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

use std::{
    fmt::Debug,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use tokio::{
    runtime::{Builder, Handle, Runtime},
    task::JoinHandle,
};

use crate::error::{Error, ErrorKind, Result};

/// A [`Runtime`] that is shut down in the background when dropped.
///
/// Dropping a runtime from inside another runtime panics, and a cache can be dropped anywhere.
pub struct BackgroundShutdownRuntime {
    handle: Handle,
    runtime: Option<Runtime>,
}

impl Debug for BackgroundShutdownRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BackgroundShutdownRuntime").finish()
    }
}

impl Drop for BackgroundShutdownRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl From<Runtime> for BackgroundShutdownRuntime {
    fn from(runtime: Runtime) -> Self {
        Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        }
    }
}

/// A wrapper for [`JoinHandle`] that maps a join failure to [`Error`].
#[derive(Debug)]
pub struct SpawnHandle<T> {
    inner: JoinHandle<T>,
}

impl<T> Future for SpawnHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner)
            .poll(cx)
            .map(|res| res.map_err(|e| Error::new(ErrorKind::External, "spawned task failed").with_source(e)))
    }
}

/// Spawns background work of the cache, on a dedicated runtime or on a borrowed one.
#[derive(Debug, Clone)]
pub enum Spawner {
    /// A runtime owned by the spawner.
    Runtime(Arc<BackgroundShutdownRuntime>),
    /// A handle of a runtime owned by someone else.
    Handle(Handle),
}

impl From<Runtime> for Spawner {
    fn from(runtime: Runtime) -> Self {
        Self::Runtime(Arc::new(runtime.into()))
    }
}

impl From<Handle> for Spawner {
    fn from(handle: Handle) -> Self {
        Self::Handle(handle)
    }
}

impl Spawner {
    /// Build a spawner that owns a small multi-thread runtime with `threads` workers named after `name`.
    pub fn dedicated(name: &str, threads: usize) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads.max(1))
            .thread_name(name)
            .enable_all()
            .build()
            .map_err(|e| {
                Error::new(ErrorKind::Config, "cannot build runtime")
                    .with_context("name", name)
                    .with_source(e)
            })?;
        Ok(runtime.into())
    }

    /// The spawner of the runtime the caller runs in, if any.
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Spawner::Handle)
    }

    fn handle(&self) -> &Handle {
        match self {
            Spawner::Runtime(rt) => &rt.handle,
            Spawner::Handle(h) => h,
        }
    }

    /// Wrapper for [`Handle::spawn`].
    pub fn spawn<F>(&self, future: F) -> SpawnHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        SpawnHandle {
            inner: self.handle().spawn(future),
        }
    }

    /// Wrapper for [`Handle::spawn_blocking`].
    pub fn spawn_blocking<F, R>(&self, func: F) -> SpawnHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        SpawnHandle {
            inner: self.handle().spawn_blocking(func),
        }
    }
}
