pub mod escape;
pub mod layer;
pub mod rewrite;

pub use layer::{PantryPathLayer, PantryPathService};
pub use rewrite::{
    build_pantry_path, build_pantry_path_with_basket, PathRewriter, RewrittenPath,
    UNKNOWN_PANTRY_ID,
};
