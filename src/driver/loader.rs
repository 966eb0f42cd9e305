//! Backend discovery, dynamic module loading, and lifecycle guarding.
//!
//! One [`ModuleHandle`] at a time is owned by the loader. Loading resolves
//! three fixed entry points, gates on the ABI version (backends newer than
//! the driver are never accepted), and instantiates the backend. Unloading
//! is refused outright while an analyze is running; the destroy entry point
//! failing also leaves everything untouched.

use std::ffi::{c_int, c_void};
use std::path::PathBuf;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use libloading::Library;
use tracing::{debug, error, warn};

use crate::core::constants::{
    DEFAULT_INSTALL_ROOT, DRIVER_ABI_VERSION, MODULE_FILE_NAME, SYM_ABI_VERSION, SYM_CREATE,
    SYM_DESTROY,
};
use crate::core::errors::{DriverError, DriverResult, LoadError};
use crate::core::traits::OcrBackend;

/// Exports the three entry points a backend module must provide.
///
/// A backend crate built as a `cdylib` invokes this with an expression
/// constructing its backend:
///
/// ```rust,ignore
/// ocr_driver::declare_backend!(MyBackend::new());
/// ```
///
/// The instantiate entry point hands ownership of a boxed
/// [`OcrBackend`](crate::core::OcrBackend) across the module boundary as an
/// opaque pointer; the destroy entry point takes it back. Modules must be
/// built against the same driver version they are loaded into.
#[macro_export]
macro_rules! declare_backend {
    ($constructor:expr) => {
        #[no_mangle]
        pub extern "C" fn ocr_backend_create() -> *mut ::std::ffi::c_void {
            let backend: ::std::boxed::Box<dyn $crate::core::OcrBackend> =
                ::std::boxed::Box::new($constructor);
            ::std::boxed::Box::into_raw(::std::boxed::Box::new(backend)) as *mut ::std::ffi::c_void
        }

        #[no_mangle]
        pub extern "C" fn ocr_backend_destroy(
            instance: *mut ::std::ffi::c_void,
        ) -> ::std::ffi::c_int {
            if instance.is_null() {
                return 0;
            }
            drop(unsafe {
                ::std::boxed::Box::from_raw(
                    instance as *mut ::std::boxed::Box<dyn $crate::core::OcrBackend>,
                )
            });
            1
        }

        #[no_mangle]
        pub extern "C" fn ocr_backend_abi_version() -> ::std::ffi::c_int {
            $crate::core::constants::DRIVER_ABI_VERSION
        }
    };
}

/// `ocr_backend_create`: returns a `Box<Box<dyn OcrBackend>>` as an opaque
/// pointer, or null on failure.
pub type RawCreateFn = unsafe extern "C" fn() -> *mut c_void;

/// `ocr_backend_destroy`: consumes the pointer; nonzero on success.
pub type RawDestroyFn = unsafe extern "C" fn(*mut c_void) -> c_int;

/// `ocr_backend_abi_version`: packed `0xMMmmpp` version integer.
pub type RawVersionFn = unsafe extern "C" fn() -> c_int;

/// The backend instance owned by a handle.
enum BackendInstance {
    /// Backend linked into the driver itself.
    Builtin(Box<dyn OcrBackend>),
    /// Backend instantiated through a dynamic module's entry points.
    Dynamic {
        instance: *mut c_void,
        destroy: RawDestroyFn,
    },
}

/// A loaded backend plus everything needed to tear it down safely.
pub struct ModuleHandle {
    // Field order matters: the backend instance must drop before the
    // library that holds its code is closed.
    backend: BackendInstance,
    abi_version: i32,
    running: Arc<AtomicBool>,
    library: Option<Library>,
}

// The raw instance pointer is produced by `ocr_backend_create`, whose
// contract requires the boxed backend to be `Send + Sync` (it is a
// `Box<dyn OcrBackend>`).
unsafe impl Send for ModuleHandle {}
unsafe impl Sync for ModuleHandle {}

impl ModuleHandle {
    /// The backend behind this handle.
    pub fn backend(&self) -> &dyn OcrBackend {
        match &self.backend {
            BackendInstance::Builtin(backend) => backend.as_ref(),
            BackendInstance::Dynamic { instance, .. } => unsafe {
                (*(*instance as *const Box<dyn OcrBackend>)).as_ref()
            },
        }
    }

    /// ABI version the backend reported (the driver's own for built-ins).
    pub fn abi_version(&self) -> i32 {
        self.abi_version
    }

    /// Whether an analyze is currently in flight on this backend.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The shared running flag, for the facade's analyze guard.
    pub(crate) fn running_flag(&self) -> &Arc<AtomicBool> {
        &self.running
    }
}

impl Drop for ModuleHandle {
    fn drop(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            // Closing the module underneath a running backend would free
            // code still executing; leak instead.
            error!("backend handle dropped while running; leaking its module");
            if let BackendInstance::Dynamic { instance, .. } = &mut self.backend {
                *instance = ptr::null_mut();
            }
            if let Some(library) = self.library.take() {
                std::mem::forget(library);
            }
            return;
        }

        if let BackendInstance::Dynamic { instance, destroy } = &mut self.backend {
            if !instance.is_null() {
                let destroy_fn = *destroy;
                let ok = unsafe { destroy_fn(*instance) } != 0;
                *instance = ptr::null_mut();
                if !ok {
                    error!("backend destroy entry point failed during teardown; leaking module");
                    if let Some(library) = self.library.take() {
                        std::mem::forget(library);
                    }
                }
            }
        }
    }
}

/// Discovers installed backends and owns the one loaded module.
pub struct BackendLoader {
    install_root: PathBuf,
    handle: Option<ModuleHandle>,
}

impl BackendLoader {
    /// Loader over the default installation root.
    pub fn new() -> Self {
        Self::with_install_root(PathBuf::from(DEFAULT_INSTALL_ROOT))
    }

    /// Loader over an explicit installation root.
    pub fn with_install_root(install_root: PathBuf) -> Self {
        BackendLoader {
            install_root,
            handle: None,
        }
    }

    /// Whether a backend with `version` can be driven by this driver.
    pub fn is_compatible(version: i32) -> bool {
        version <= DRIVER_ABI_VERSION
    }

    /// Names of installable backends: the immediate subdirectories of the
    /// installation root. An absent or empty root is an empty list.
    pub fn list_backends(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.install_root) else {
            return Vec::new();
        };
        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect()
    }

    /// The loaded module, if any.
    pub fn handle(&self) -> Option<&ModuleHandle> {
        self.handle.as_ref()
    }

    /// Loads the named backend's dynamic module.
    ///
    /// Any previously loaded backend is unloaded first; if that unload is
    /// refused the whole load aborts. Failures at any later step close the
    /// module before returning and leave the loader empty.
    pub fn load(&mut self, name: &str) -> DriverResult<()> {
        if !self.list_backends().iter().any(|n| n == name) {
            warn!("backend '{name}' is not installed");
            return Err(LoadError::UnknownBackend {
                name: name.to_string(),
            }
            .into());
        }

        self.unload()?;

        let path = self
            .install_root
            .join(name)
            .join(MODULE_FILE_NAME);
        debug!("opening backend module {}", path.display());
        let library = unsafe { Library::new(&path) }.map_err(|e| LoadError::OpenFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;

        // Resolve all three entry points before touching any of them.
        let create: RawCreateFn = unsafe {
            *library
                .get::<RawCreateFn>(SYM_CREATE.as_bytes())
                .map_err(|_| LoadError::MissingSymbol { symbol: SYM_CREATE })?
        };
        let destroy: RawDestroyFn = unsafe {
            *library
                .get::<RawDestroyFn>(SYM_DESTROY.as_bytes())
                .map_err(|_| LoadError::MissingSymbol {
                    symbol: SYM_DESTROY,
                })?
        };
        let version_fn: RawVersionFn = unsafe {
            *library
                .get::<RawVersionFn>(SYM_ABI_VERSION.as_bytes())
                .map_err(|_| LoadError::MissingSymbol {
                    symbol: SYM_ABI_VERSION,
                })?
        };

        let version = unsafe { version_fn() };
        if !Self::is_compatible(version) {
            warn!(
                "backend '{name}' reports ABI {version:#08x}, driver supports {DRIVER_ABI_VERSION:#08x}"
            );
            return Err(LoadError::IncompatibleAbi {
                found: version,
                supported: DRIVER_ABI_VERSION,
            }
            .into());
        }

        let instance = unsafe { create() };
        if instance.is_null() {
            return Err(LoadError::InstantiationFailed.into());
        }

        self.handle = Some(ModuleHandle {
            backend: BackendInstance::Dynamic { instance, destroy },
            abi_version: version,
            running: Arc::new(AtomicBool::new(false)),
            library: Some(library),
        });
        debug!("backend '{name}' loaded");
        Ok(())
    }

    /// Binds a backend linked into the driver, bypassing module loading.
    ///
    /// Still subject to the prior-backend unload rule.
    pub fn load_backend(&mut self, backend: Box<dyn OcrBackend>) -> DriverResult<()> {
        self.unload()?;
        self.handle = Some(ModuleHandle {
            backend: BackendInstance::Builtin(backend),
            abi_version: DRIVER_ABI_VERSION,
            running: Arc::new(AtomicBool::new(false)),
            library: None,
        });
        Ok(())
    }

    /// Destroys the loaded backend and closes its module.
    ///
    /// No-op success when nothing is loaded. Refused, with state untouched,
    /// while running or when the destroy entry point reports failure.
    pub fn unload(&mut self) -> DriverResult<()> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(());
        };

        if handle.running.load(Ordering::SeqCst) {
            warn!("unload refused: analyze is running");
            return Err(DriverError::UnloadRefused {
                reason: "analyze is running",
            });
        }

        if let BackendInstance::Dynamic { instance, destroy } = &mut handle.backend {
            if !instance.is_null() {
                let destroy_fn = *destroy;
                if unsafe { destroy_fn(*instance) } == 0 {
                    warn!("unload refused: destroy entry point failed");
                    return Err(DriverError::UnloadRefused {
                        reason: "backend destroy entry point failed",
                    });
                }
                *instance = ptr::null_mut();
            }
        }

        // Dropping the handle closes the module.
        self.handle = None;
        Ok(())
    }
}

impl Default for BackendLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::DriverError;
    use crate::core::types::{HardwareClass, PixelLayout, TextBox};

    struct IdleBackend;

    impl OcrBackend for IdleBackend {
        fn hardware_support(&self) -> Vec<HardwareClass> {
            vec![HardwareClass::CpuAny]
        }
        fn pixel_layout(&self) -> Option<PixelLayout> {
            None
        }
        fn languages(&self) -> Vec<String> {
            vec!["en".to_string()]
        }
        fn set_language(&self, _language: &str) -> DriverResult<()> {
            Ok(())
        }
        fn analyze(&self) -> DriverResult<bool> {
            Ok(false)
        }
        fn text_boxes(&self) -> Vec<TextBox> {
            Vec::new()
        }
        fn all_text(&self) -> String {
            String::new()
        }
        fn box_text(&self, _index: usize) -> String {
            String::new()
        }
    }

    #[test]
    fn compatibility_is_forward_only() {
        assert!(BackendLoader::is_compatible(DRIVER_ABI_VERSION));
        assert!(BackendLoader::is_compatible(DRIVER_ABI_VERSION - 1));
        assert!(BackendLoader::is_compatible(0));
        assert!(!BackendLoader::is_compatible(DRIVER_ABI_VERSION + 1));
    }

    #[test]
    fn list_backends_returns_subdirectories_only() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("paddle")).unwrap();
        std::fs::create_dir(root.path().join("online")).unwrap();
        std::fs::write(root.path().join("README"), b"not a backend").unwrap();

        let loader = BackendLoader::with_install_root(root.path().to_path_buf());
        let mut names = loader.list_backends();
        names.sort();
        assert_eq!(names, vec!["online".to_string(), "paddle".to_string()]);
    }

    #[test]
    fn missing_root_lists_nothing() {
        let loader = BackendLoader::with_install_root(PathBuf::from("/nonexistent/backends"));
        assert!(loader.list_backends().is_empty());
    }

    #[test]
    fn unknown_name_is_a_load_failure() {
        let root = tempfile::tempdir().unwrap();
        let mut loader = BackendLoader::with_install_root(root.path().to_path_buf());
        assert!(matches!(
            loader.load("ghost"),
            Err(DriverError::LoadFailure(LoadError::UnknownBackend { .. }))
        ));
        assert!(loader.handle().is_none());
    }

    #[test]
    fn unopenable_module_is_a_load_failure() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("broken")).unwrap();

        let mut loader = BackendLoader::with_install_root(root.path().to_path_buf());
        assert!(matches!(
            loader.load("broken"),
            Err(DriverError::LoadFailure(LoadError::OpenFailed { .. }))
        ));
        assert!(loader.handle().is_none());
    }

    #[test]
    fn builtin_backend_lifecycle() {
        let mut loader = BackendLoader::with_install_root(PathBuf::from("/nonexistent"));
        loader.load_backend(Box::new(IdleBackend)).unwrap();

        let handle = loader.handle().unwrap();
        assert_eq!(handle.abi_version(), DRIVER_ABI_VERSION);
        assert!(!handle.is_running());
        assert_eq!(handle.backend().languages(), vec!["en".to_string()]);

        loader.unload().unwrap();
        assert!(loader.handle().is_none());

        // Unloading an empty loader is a no-op success.
        loader.unload().unwrap();
    }

    #[test]
    fn loading_replaces_the_previous_backend() {
        let mut loader = BackendLoader::with_install_root(PathBuf::from("/nonexistent"));
        loader.load_backend(Box::new(IdleBackend)).unwrap();
        loader.load_backend(Box::new(IdleBackend)).unwrap();
        assert!(loader.handle().is_some());
    }

    #[test]
    fn unload_refused_while_running_leaves_backend_loaded() {
        let mut loader = BackendLoader::with_install_root(PathBuf::from("/nonexistent"));
        loader.load_backend(Box::new(IdleBackend)).unwrap();
        loader
            .handle()
            .unwrap()
            .running_flag()
            .store(true, Ordering::SeqCst);

        assert!(matches!(
            loader.unload(),
            Err(DriverError::UnloadRefused { .. })
        ));
        assert!(loader.handle().is_some());

        loader
            .handle()
            .unwrap()
            .running_flag()
            .store(false, Ordering::SeqCst);
        loader.unload().unwrap();
    }

    mod entry_points {
        use crate::core::errors::DriverResult;
        use crate::core::traits::OcrBackend;
        use crate::core::types::{HardwareClass, PixelLayout, TextBox};

        struct MacroBackend;

        impl OcrBackend for MacroBackend {
            fn hardware_support(&self) -> Vec<HardwareClass> {
                vec![HardwareClass::CpuAny]
            }
            fn pixel_layout(&self) -> Option<PixelLayout> {
                None
            }
            fn languages(&self) -> Vec<String> {
                vec!["macro".to_string()]
            }
            fn set_language(&self, _language: &str) -> DriverResult<()> {
                Ok(())
            }
            fn analyze(&self) -> DriverResult<bool> {
                Ok(false)
            }
            fn text_boxes(&self) -> Vec<TextBox> {
                Vec::new()
            }
            fn all_text(&self) -> String {
                String::new()
            }
            fn box_text(&self, _index: usize) -> String {
                String::new()
            }
        }

        crate::declare_backend!(MacroBackend);
    }

    #[test]
    fn entry_point_convention_round_trips() {
        assert_eq!(entry_points::ocr_backend_abi_version(), DRIVER_ABI_VERSION);

        let instance = entry_points::ocr_backend_create();
        assert!(!instance.is_null());

        let handle = ModuleHandle {
            backend: BackendInstance::Dynamic {
                instance,
                destroy: entry_points::ocr_backend_destroy,
            },
            abi_version: entry_points::ocr_backend_abi_version(),
            running: Arc::new(AtomicBool::new(false)),
            library: None,
        };
        assert_eq!(handle.backend().languages(), vec!["macro".to_string()]);

        // Dropping the handle destroys the instance through the entry point.
        drop(handle);

        // Destroying null reports failure instead of faulting.
        assert_eq!(entry_points::ocr_backend_destroy(std::ptr::null_mut()), 0);
    }

    #[test]
    fn refused_unload_aborts_a_subsequent_load() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("next")).unwrap();

        let mut loader = BackendLoader::with_install_root(root.path().to_path_buf());
        loader.load_backend(Box::new(IdleBackend)).unwrap();
        loader
            .handle()
            .unwrap()
            .running_flag()
            .store(true, Ordering::SeqCst);

        // The running backend blocks the unload step of `load`.
        assert!(matches!(
            loader.load("next"),
            Err(DriverError::UnloadRefused { .. })
        ));
        assert!(loader.handle().is_some());
    }
}
