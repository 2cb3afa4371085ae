//! Feature engineering: windowed popularity, static profile features, the
//! wide-table merge, and as-of binding onto the splits.

pub mod base;
pub mod binder;
pub mod config;
pub mod extra;
pub mod merge;
pub mod popularity;
pub mod registry;

pub use binder::{asof_backward, bind, resolve_bind_plan, to_matrix, BindStep};
pub use config::{BindGroup, FeatureGroup, FeaturesConfig, POST_FEATURES, USER_FEATURES};
pub use merge::{left_join, merge_groups, FeatureManifest, ManifestGroup};
pub use popularity::{trailing_window_stats, WindowStats};
pub use registry::{ExtractFn, ExtractorSettings, FeatureExtractor, FeatureRegistry, FeatureTable, GroupTables};
