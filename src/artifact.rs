//! Ownership of the rendered WAV and its transient `blob:` reference.
//!
//! The [`ArtifactManager`] is the only party allowed to mint or revoke
//! references. Everyone else reads through a [`BlobResolver`] or a cloned
//! [`ArtifactHandle`], which stops resolving as soon as the artifact is
//! superseded or released.

use crate::error::ReferenceLifecycleViolation;
use crate::wav;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

const HANDLE_SCHEME: &str = "blob:vox-render";

static NEXT_SCOPE: AtomicU64 = AtomicU64::new(1);

fn next_scope() -> u64 {
    NEXT_SCOPE.fetch_add(1, Ordering::Relaxed)
}

/// Process-local URI naming an in-memory artifact, e.g. `blob:vox-render/1/4`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactHandle(String);

impl ArtifactHandle {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backing store for transient references.
pub trait ReferenceStore {
    /// Registers `bytes` and returns a fresh handle to them
    fn mint(&mut self, bytes: Arc<[u8]>) -> ArtifactHandle;

    /// Invalidates `handle`. Returns false if it was not live.
    fn revoke(&mut self, handle: &ArtifactHandle) -> bool;

    /// Dereferences a live handle
    fn resolve(&self, handle: &ArtifactHandle) -> Option<Arc<[u8]>>;
}

#[derive(Debug)]
struct BlobTable {
    scope: u64,
    next_id: u64,
    blobs: HashMap<ArtifactHandle, Arc<[u8]>>,
}

/// In-memory [`ReferenceStore`]. Only its owner can mint or revoke; hand
/// other parties a [`BlobResolver`].
#[derive(Debug)]
pub struct BlobStore {
    table: Rc<RefCell<BlobTable>>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self {
            table: Rc::new(RefCell::new(BlobTable {
                scope: next_scope(),
                next_id: 1,
                blobs: HashMap::new(),
            })),
        }
    }

    /// Read-only view for consumers such as the output device.
    pub fn resolver(&self) -> BlobResolver {
        BlobResolver {
            table: Rc::clone(&self.table),
        }
    }

}

impl Default for BlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceStore for BlobStore {
    fn mint(&mut self, bytes: Arc<[u8]>) -> ArtifactHandle {
        let mut table = self.table.borrow_mut();
        let handle = ArtifactHandle(format!("{}/{}/{}", HANDLE_SCHEME, table.scope, table.next_id));
        table.next_id += 1;
        table.blobs.insert(handle.clone(), bytes);
        handle
    }

    fn revoke(&mut self, handle: &ArtifactHandle) -> bool {
        self.table.borrow_mut().blobs.remove(handle).is_some()
    }

    fn resolve(&self, handle: &ArtifactHandle) -> Option<Arc<[u8]>> {
        self.table.borrow().blobs.get(handle).cloned()
    }
}

/// Dereferences handles minted by a [`BlobStore`] without being able to
/// change them.
#[derive(Debug, Clone)]
pub struct BlobResolver {
    table: Rc<RefCell<BlobTable>>,
}

impl BlobResolver {
    pub fn resolve(&self, handle: &ArtifactHandle) -> Option<Arc<[u8]>> {
        self.table.borrow().blobs.get(handle).cloned()
    }

    /// Number of references currently live in the store.
    pub fn live_count(&self) -> usize {
        self.table.borrow().blobs.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ArtifactId {
    manager: u64,
    seq: u64,
}

/// An installed WAV file. The bytes never change after install.
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    id: ArtifactId,
    bytes: Arc<[u8]>,
    handle: ArtifactHandle,
}

impl AudioArtifact {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn handle(&self) -> &ArtifactHandle {
        &self.handle
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Playing time according to the WAV header, if it has one.
    pub fn duration_secs(&self) -> Option<f64> {
        wav::parse_header(&self.bytes).map(|(format, data_len)| format.duration_secs(data_len))
    }

    /// Writes the artifact to `dir/file_name` and returns the full path.
    pub fn save(&self, dir: &Path, file_name: &str) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(file_name);
        std::fs::write(&path, &self.bytes)?;
        info!("Saved {} bytes to {}", self.bytes.len(), path.display());
        Ok(path)
    }
}

/// Owns the single active artifact and its reference.
pub struct ArtifactManager<S: ReferenceStore> {
    store: S,
    instance: u64,
    next_seq: u64,
    current: Option<AudioArtifact>,
}

impl<S: ReferenceStore> ArtifactManager<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            instance: next_scope(),
            next_seq: 0,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&AudioArtifact> {
        self.current.as_ref()
    }

    pub fn resolve(&self, handle: &ArtifactHandle) -> Option<Arc<[u8]>> {
        self.store.resolve(handle)
    }

    /// Installs `bytes` as the active artifact. Any previous artifact's
    /// reference is revoked before the new one is minted.
    pub fn install(
        &mut self,
        bytes: Vec<u8>,
    ) -> Result<&AudioArtifact, ReferenceLifecycleViolation> {
        self.retire_current()?;

        let bytes: Arc<[u8]> = bytes.into();
        let handle = self.store.mint(Arc::clone(&bytes));
        let id = ArtifactId {
            manager: self.instance,
            seq: self.next_seq,
        };
        self.next_seq += 1;

        info!("Installed artifact {} ({} bytes)", handle, bytes.len());
        let installed: &AudioArtifact = self.current.insert(AudioArtifact { id, bytes, handle });
        Ok(installed)
    }

    /// Invalidates `artifact`'s reference. Releasing an artifact that has
    /// already been retired is a no-op.
    pub fn release(&mut self, artifact: &AudioArtifact) -> Result<(), ReferenceLifecycleViolation> {
        if artifact.id.manager != self.instance || artifact.id.seq >= self.next_seq {
            error!("Release of foreign artifact {}", artifact.handle);
            return Err(ReferenceLifecycleViolation::NotInstalled {
                handle: artifact.handle.to_string(),
            });
        }

        let is_current = self
            .current
            .as_ref()
            .is_some_and(|current| current.id == artifact.id);
        if is_current {
            self.retire_current()
        } else {
            debug!("Artifact {} already released", artifact.handle);
            Ok(())
        }
    }

    /// Releases whatever is installed. Called on teardown.
    pub fn clear(&mut self) -> Result<(), ReferenceLifecycleViolation> {
        self.retire_current()
    }

    fn retire_current(&mut self) -> Result<(), ReferenceLifecycleViolation> {
        let Some(old) = self.current.take() else {
            return Ok(());
        };

        if self.store.revoke(&old.handle) {
            debug!("Revoked {}", old.handle);
            Ok(())
        } else {
            error!("Reference {} was not live at revoke time", old.handle);
            Err(ReferenceLifecycleViolation::StaleReference {
                handle: old.handle.to_string(),
            })
        }
    }
}

impl<S: ReferenceStore> Drop for ArtifactManager<S> {
    fn drop(&mut self) {
        if let Err(e) = self.retire_current() {
            error!("Teardown: {}", e);
        }
    }
}
