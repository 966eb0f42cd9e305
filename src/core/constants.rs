//! Constants shared across the driver and the local inference pipeline.

/// ABI version compiled into this driver, packed as `0xMMmmpp`
/// (major/minor/patch). Backends reporting a newer version are rejected;
/// older or equal versions are accepted.
pub const DRIVER_ABI_VERSION: i32 = 0x01_00_00;

/// Conventional file name of a backend's loadable module inside its
/// installation subdirectory.
pub const MODULE_FILE_NAME: &str = "libbackend.so";

/// Entry point resolved from a backend module to instantiate the backend.
pub const SYM_CREATE: &str = "ocr_backend_create";

/// Entry point resolved from a backend module to destroy an instance.
pub const SYM_DESTROY: &str = "ocr_backend_destroy";

/// Entry point resolved from a backend module to query its ABI version.
pub const SYM_ABI_VERSION: &str = "ocr_backend_abi_version";

/// Default installation root scanned for backend subdirectories.
pub const DEFAULT_INSTALL_ROOT: &str = "/usr/lib/ocr-driver/backends";

/// Environment variable holding the colon-separated data search path.
pub const DATA_DIRS_ENV: &str = "XDG_DATA_DIRS";

/// Subpath appended to each search-path entry when locating models.
pub const MODEL_SUBPATH: &str = "ocr-driver/models";

/// Fallback model root used when no search-path entry matches.
pub const DEFAULT_MODEL_ROOT: &str = "/usr/share/ocr-driver/models";

/// Longer input side is capped at this length before detection.
pub const DET_LIMIT_SIDE_MAX: u32 = 960;

/// Shorter input side is floored at this length before detection; below it
/// the detector starts missing text.
pub const DET_LIMIT_SIDE_MIN: u32 = 64;

/// Detection network input dimensions must be multiples of this stride.
pub const DET_STRIDE: u32 = 32;

/// Default threshold for binarizing the detection probability map.
pub const DET_DB_THRESH: f32 = 0.3;

/// Default confidence threshold for keeping an extracted box.
pub const DET_DB_BOX_THRESH: f32 = 0.5;

/// Default boundary-expansion ratio applied to extracted boxes.
pub const DET_UNCLIP_RATIO: f32 = 1.6;

/// Per-channel mean used to normalize detection input (×255).
pub const DET_MEAN: [f32; 3] = [0.485 * 255.0, 0.456 * 255.0, 0.406 * 255.0];

/// Per-channel reciprocal std used to normalize detection input.
pub const DET_STD_INV: [f32; 3] = [
    1.0 / (0.229 * 255.0),
    1.0 / (0.224 * 255.0),
    1.0 / (0.225 * 255.0),
];

/// Fixed input height of the recognition network.
pub const REC_IMAGE_HEIGHT: u32 = 32;

/// Neutral fill used when right-padding recognition input.
pub const REC_PAD_FILL: u8 = 127;

/// Temporal downsampling factor of the recognition network: one output
/// timestep covers this many input columns.
pub const REC_DOWNSAMPLE: f32 = 4.0;

/// Display form of the reserved blank symbol at dictionary index 0.
pub const DICT_BLANK_SYMBOL: &str = "#";

/// Reserved space symbol appended at the end of every dictionary.
pub const DICT_SPACE_SYMBOL: &str = " ";
