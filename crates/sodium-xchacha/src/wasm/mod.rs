//! Linear-memory backend.
//!
//! Buffers live inside the module's linear memory and are addressed by
//! offset. Allocation may grow, and therefore relocate, that memory; handles
//! survive because every view is re-derived against the current memory when
//! the identity recorded in its cache no longer matches.

mod view;

use std::fmt;
use std::sync::Arc;

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use tracing::{info, trace};

use crate::aead::{self, ABYTES, KEYBYTES, NPUBBYTES, NSECBYTES};
use crate::backend::Backend;
use crate::buffer::{BufferPointer, check_subrange};
use crate::config::ModuleConfig;
use crate::error::{AeadOp, Result, SodiumError};
use crate::module::{MemoryIdentity, NULL, Ptr, SodiumModule, SoftModule};

use self::view::ViewCache;

/// Maximum message length of a 32-bit module: `SIZE_MAX - ABYTES`.
pub const MESSAGEBYTES_MAX: usize = u32::MAX as usize - ABYTES;

/// Size of the out-parameter scratch slot (`unsigned long long`).
const SCRATCH_BYTES: u32 = 8;

struct Shared {
    module: RwLock<Box<dyn SodiumModule>>,
}

/// Buffer pointer into module memory.
///
/// Only handles returned by `alloc`/`transfer` own their allocation.
/// Sub-regions borrow it by offset and their [`free`](BufferPointer::free)
/// does nothing. Dropping an owning handle without calling `free` leaks the
/// allocation inside the module.
pub struct WasmBufferPointer {
    shared: Arc<Shared>,
    ptr: Ptr,
    len: usize,
    owned: bool,
    cache: ViewCache,
}

impl WasmBufferPointer {
    fn new(shared: Arc<Shared>, ptr: Ptr, len: usize, owned: bool) -> Self {
        Self {
            shared,
            ptr,
            len,
            owned,
            cache: ViewCache::new(),
        }
    }

    /// Offset of the region in module memory.
    #[must_use]
    pub fn address(&self) -> u32 {
        self.ptr
    }

    /// Whether this handle owns its allocation.
    #[must_use]
    pub fn is_owner(&self) -> bool {
        self.owned
    }

    /// Memory identity the cached view was last derived against, if any.
    #[must_use]
    pub fn cached_identity(&self) -> Option<MemoryIdentity> {
        self.cache.identity()
    }
}

impl fmt::Debug for WasmBufferPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WasmBufferPointer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("owned", &self.owned)
            .finish_non_exhaustive()
    }
}

impl BufferPointer for WasmBufferPointer {
    type View<'a> = MappedRwLockReadGuard<'a, [u8]>;
    type ViewMut<'a> = MappedRwLockWriteGuard<'a, [u8]>;

    fn len(&self) -> usize {
        self.len
    }

    fn view(&self) -> Self::View<'_> {
        let module = self.shared.module.read_recursive();
        let range = self
            .cache
            .resolve(module.memory_identity(), self.ptr, self.len);
        RwLockReadGuard::map(module, move |module| &module.memory()[range])
    }

    fn view_mut(&self) -> Self::ViewMut<'_> {
        let module = self.shared.module.write();
        let range = self
            .cache
            .resolve(module.memory_identity(), self.ptr, self.len);
        RwLockWriteGuard::map(module, move |module| &mut module.memory_mut()[range])
    }

    fn free(self) {
        if !self.owned {
            return;
        }
        self.shared.module.write().free(self.ptr);
        trace!(ptr = self.ptr, len = self.len, "released buffer");
    }

    fn subarray(&self, start: usize, end: usize) -> Result<Self> {
        check_subrange(start, end, self.len)?;
        // start <= len, and len fits the 32-bit address space of the module
        let ptr = self.ptr + start as u32;
        Ok(Self::new(Arc::clone(&self.shared), ptr, end - start, false))
    }
}

/// Backend driving a libsodium module through its linear memory.
pub struct WasmBackend {
    shared: Arc<Shared>,
    scratch: Ptr,
}

impl fmt::Debug for WasmBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WasmBackend")
            .field("scratch", &self.scratch)
            .field("memory_size", &self.memory_size())
            .finish_non_exhaustive()
    }
}

fn init_error(reason: impl fmt::Display) -> SodiumError {
    SodiumError::InitializationFailed(reason.to_string())
}

/// Compare the constants a module reports with the ones this crate assumes.
///
/// Reported values are C `size_t`s returned through an `i32`, so they are
/// reinterpreted as unsigned before comparing.
fn verify_constants(module: &dyn SodiumModule) -> Result<()> {
    let reported = [
        ("abytes", module.crypto_aead_xchacha20poly1305_ietf_abytes(), ABYTES),
        ("keybytes", module.crypto_aead_xchacha20poly1305_ietf_keybytes(), KEYBYTES),
        ("npubbytes", module.crypto_aead_xchacha20poly1305_ietf_npubbytes(), NPUBBYTES),
        ("nsecbytes", module.crypto_aead_xchacha20poly1305_ietf_nsecbytes(), NSECBYTES),
        (
            "messagebytes_max",
            module.crypto_aead_xchacha20poly1305_ietf_messagebytes_max(),
            MESSAGEBYTES_MAX,
        ),
    ];
    for (name, value, expected) in reported {
        let value = value as u32 as usize;
        if value != expected {
            return Err(init_error(format!(
                "module reports {name} = {value}, expected {expected}"
            )));
        }
    }
    Ok(())
}

fn check_status(operation: AeadOp, status: i32) -> Result<()> {
    if status != 0 {
        return Err(SodiumError::from_status(operation));
    }
    Ok(())
}

fn module_ptr(buf: Option<&WasmBufferPointer>) -> (Ptr, u64) {
    buf.map_or((NULL, 0), |buf| (buf.ptr, buf.len as u64))
}

impl WasmBackend {
    /// Start a backend on an in-process module laid out by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SodiumError::InitializationFailed`] if the configuration is
    /// invalid or the module fails to start.
    pub fn with_config(config: &ModuleConfig) -> Result<Self> {
        let module = SoftModule::new(config).map_err(init_error)?;
        Self::with_module(Box::new(module))
    }

    /// Start a backend on an existing module.
    ///
    /// Runs `sodium_init`, checks the reported constants and reserves the
    /// out-parameter scratch slot.
    ///
    /// # Errors
    ///
    /// Returns [`SodiumError::InitializationFailed`] if any of those steps
    /// fails.
    pub fn with_module(mut module: Box<dyn SodiumModule>) -> Result<Self> {
        let status = module.sodium_init();
        if status < 0 {
            return Err(init_error(format!("sodium_init returned {status}")));
        }
        verify_constants(&*module)?;

        let scratch = module.malloc(SCRATCH_BYTES);
        if scratch == NULL {
            return Err(init_error("no memory for the out-parameter slot"));
        }

        info!(
            memory_bytes = module.memory().len(),
            already_initialized = status == 1,
            "WASM-based libsodium initialized"
        );
        Ok(Self {
            shared: Arc::new(Shared {
                module: RwLock::new(module),
            }),
            scratch,
        })
    }

    /// Identity of the module memory's current backing storage.
    #[must_use]
    pub fn memory_identity(&self) -> MemoryIdentity {
        self.shared.module.read_recursive().memory_identity()
    }

    /// Current module memory size in bytes.
    #[must_use]
    pub fn memory_size(&self) -> usize {
        self.shared.module.read_recursive().memory().len()
    }

    fn check_owned(&self, operation: AeadOp, buffers: &[Option<&WasmBufferPointer>]) -> Result<()> {
        let foreign = buffers
            .iter()
            .flatten()
            .any(|buf| !Arc::ptr_eq(&buf.shared, &self.shared));
        if foreign {
            return Err(SodiumError::ForeignBuffer { operation });
        }
        Ok(())
    }

    /// Value the last call stored in the scratch slot.
    fn read_scratch(&self, module: &dyn SodiumModule, operation: AeadOp) -> Result<usize> {
        let start = self.scratch as usize;
        let mut raw = [0u8; SCRATCH_BYTES as usize];
        let end = start + raw.len();
        raw.copy_from_slice(&module.memory()[start..end]);
        usize::try_from(u64::from_le_bytes(raw)).map_err(|_| SodiumError::CallFailed { operation })
    }

    fn allocate(&self, module: &mut dyn SodiumModule, byte_length: usize) -> Result<Ptr> {
        let failed = || SodiumError::AllocationFailed {
            requested: byte_length,
        };
        let size = u32::try_from(byte_length).map_err(|_| failed())?;
        let ptr = module.malloc(size);
        if ptr == NULL {
            return Err(failed());
        }
        trace!(ptr, len = byte_length, "allocated buffer");
        Ok(ptr)
    }
}

impl Drop for WasmBackend {
    fn drop(&mut self) {
        self.shared.module.write().free(self.scratch);
    }
}

impl Backend for WasmBackend {
    type Buffer = WasmBufferPointer;

    const NATIVE: bool = false;
    const WASM: bool = true;
    const MESSAGEBYTES_MAX: usize = MESSAGEBYTES_MAX;

    fn load() -> Result<Self> {
        let config = ModuleConfig::from_env().map_err(init_error)?;
        Self::with_config(&config)
    }

    fn alloc(&self, byte_length: usize, zero: bool) -> Result<WasmBufferPointer> {
        let mut module = self.shared.module.write();
        let ptr = self.allocate(&mut **module, byte_length)?;
        if zero {
            let start = ptr as usize;
            module.memory_mut()[start..start + byte_length].fill(0);
        }
        Ok(WasmBufferPointer::new(
            Arc::clone(&self.shared),
            ptr,
            byte_length,
            true,
        ))
    }

    fn transfer(&self, bytes: impl Into<Vec<u8>>) -> Result<WasmBufferPointer> {
        let bytes = bytes.into();
        let mut module = self.shared.module.write();
        let ptr = self.allocate(&mut **module, bytes.len())?;
        let start = ptr as usize;
        module.memory_mut()[start..start + bytes.len()].copy_from_slice(&bytes);
        Ok(WasmBufferPointer::new(
            Arc::clone(&self.shared),
            ptr,
            bytes.len(),
            true,
        ))
    }

    fn encrypt(
        &self,
        c: &WasmBufferPointer,
        m: &WasmBufferPointer,
        ad: Option<&WasmBufferPointer>,
        nsec: Option<&WasmBufferPointer>,
        npub: &WasmBufferPointer,
        k: &WasmBufferPointer,
    ) -> Result<usize> {
        let op = AeadOp::Encrypt;
        aead::reject_secret_nonce(op, nsec)?;
        self.check_owned(op, &[Some(c), Some(m), ad, Some(npub), Some(k)])?;
        aead::validate_encrypt(MESSAGEBYTES_MAX, c.len(), m.len(), npub.len(), k.len())?;

        let (ad_ptr, ad_len) = module_ptr(ad);
        let mut module = self.shared.module.write();
        let status = module.crypto_aead_xchacha20poly1305_ietf_encrypt(
            c.ptr,
            self.scratch,
            m.ptr,
            m.len as u64,
            ad_ptr,
            ad_len,
            NULL,
            npub.ptr,
            k.ptr,
        );
        check_status(op, status)?;
        self.read_scratch(&**module, op)
    }

    fn decrypt(
        &self,
        m: &WasmBufferPointer,
        nsec: Option<&WasmBufferPointer>,
        c: &WasmBufferPointer,
        ad: Option<&WasmBufferPointer>,
        npub: &WasmBufferPointer,
        k: &WasmBufferPointer,
    ) -> Result<usize> {
        let op = AeadOp::Decrypt;
        aead::reject_secret_nonce(op, nsec)?;
        self.check_owned(op, &[Some(m), Some(c), ad, Some(npub), Some(k)])?;
        aead::validate_decrypt(MESSAGEBYTES_MAX, m.len(), c.len(), npub.len(), k.len())?;

        let (ad_ptr, ad_len) = module_ptr(ad);
        let mut module = self.shared.module.write();
        let status = module.crypto_aead_xchacha20poly1305_ietf_decrypt(
            m.ptr,
            self.scratch,
            NULL,
            c.ptr,
            c.len as u64,
            ad_ptr,
            ad_len,
            npub.ptr,
            k.ptr,
        );
        check_status(op, status)?;
        self.read_scratch(&**module, op)
    }

    fn encrypt_detached(
        &self,
        c: &WasmBufferPointer,
        mac: &WasmBufferPointer,
        m: &WasmBufferPointer,
        ad: Option<&WasmBufferPointer>,
        nsec: Option<&WasmBufferPointer>,
        npub: &WasmBufferPointer,
        k: &WasmBufferPointer,
    ) -> Result<usize> {
        let op = AeadOp::EncryptDetached;
        aead::reject_secret_nonce(op, nsec)?;
        self.check_owned(op, &[Some(c), Some(mac), Some(m), ad, Some(npub), Some(k)])?;
        aead::validate_encrypt_detached(
            MESSAGEBYTES_MAX,
            c.len(),
            mac.len(),
            m.len(),
            npub.len(),
            k.len(),
        )?;

        let (ad_ptr, ad_len) = module_ptr(ad);
        let mut module = self.shared.module.write();
        let status = module.crypto_aead_xchacha20poly1305_ietf_encrypt_detached(
            c.ptr,
            mac.ptr,
            self.scratch,
            m.ptr,
            m.len as u64,
            ad_ptr,
            ad_len,
            NULL,
            npub.ptr,
            k.ptr,
        );
        check_status(op, status)?;
        self.read_scratch(&**module, op)
    }

    fn decrypt_detached(
        &self,
        m: &WasmBufferPointer,
        nsec: Option<&WasmBufferPointer>,
        c: &WasmBufferPointer,
        mac: &WasmBufferPointer,
        ad: Option<&WasmBufferPointer>,
        npub: &WasmBufferPointer,
        k: &WasmBufferPointer,
    ) -> Result<()> {
        let op = AeadOp::DecryptDetached;
        aead::reject_secret_nonce(op, nsec)?;
        self.check_owned(op, &[Some(m), Some(c), Some(mac), ad, Some(npub), Some(k)])?;
        aead::validate_decrypt_detached(
            MESSAGEBYTES_MAX,
            m.len(),
            c.len(),
            mac.len(),
            npub.len(),
            k.len(),
        )?;

        let (ad_ptr, ad_len) = module_ptr(ad);
        let status = self
            .shared
            .module
            .write()
            .crypto_aead_xchacha20poly1305_ietf_decrypt_detached(
                m.ptr,
                NULL,
                c.ptr,
                c.len as u64,
                mac.ptr,
                ad_ptr,
                ad_len,
                npub.ptr,
                k.ptr,
            );
        check_status(op, status)
    }
}
