//! Typed builders for engine commands.
//!
//! Each function returns a [`JobBuilder`] pre-populated with the command
//! path and the argument shapes the engine declares for it, so callers
//! get correct CLI rendering without carrying shape metadata themselves.
//! This curated set covers the commands the orchestration layer itself
//! exercises; the full command tree is produced by a generation step
//! outside this crate.

use crate::args::ArgShape;
use crate::job::{Job, JobBuilder};

/// Raster commands.
pub mod raster {
    use super::*;

    /// Converts a raster between formats.
    #[must_use]
    pub fn convert() -> JobBuilder {
        Job::build(["raster", "convert"])
            .shape(ArgShape::repeatable("creation-option"))
            .shape(ArgShape::flag("overwrite"))
    }

    /// Reprojects a raster to a target CRS.
    #[must_use]
    pub fn reproject() -> JobBuilder {
        Job::build(["raster", "reproject"])
            .shape(ArgShape::scalar("dst-crs"))
            .shape(ArgShape::tuple("resolution", 2))
            .shape(ArgShape::flag("overwrite"))
    }

    /// Reports raster metadata as JSON on standard output.
    #[must_use]
    pub fn info() -> JobBuilder {
        Job::build(["raster", "info"]).stream_out(crate::job::StreamFormat::Json)
    }
}

/// Vector commands.
pub mod vector {
    use super::*;

    /// Converts a vector dataset between formats.
    #[must_use]
    pub fn convert() -> JobBuilder {
        Job::build(["vector", "convert"])
            .shape(ArgShape::repeatable("layer-creation-option"))
            .shape(ArgShape::flag("overwrite"))
    }

    /// Reprojects a vector dataset to a target CRS.
    #[must_use]
    pub fn reproject() -> JobBuilder {
        Job::build(["vector", "reproject"]).shape(ArgShape::scalar("dst-crs"))
    }

    /// Burns vector geometries into a raster.
    #[must_use]
    pub fn rasterize() -> JobBuilder {
        Job::build(["vector", "rasterize"])
            .shape(ArgShape::scalar("burn"))
            .shape(ArgShape::tuple("resolution", 2))
            .shape(ArgShape::tuple("size", 2))
            .shape(ArgShape::flag("overwrite"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_builders_bake_in_shapes() {
        let job = vector::rasterize()
            .arg("input", "in.shp")
            .arg("output", "out.tif")
            .arg("resolution", json!([10, 10]))
            .finish()
            .unwrap();
        assert!(job.argument_shapes["resolution"].is_tuple());
        let argv = job.to_argv();
        assert_eq!(argv[argv.len() - 2], "--resolution");
        assert_eq!(argv[argv.len() - 1], "10,10");
    }

    #[test]
    fn test_repeatable_creation_options_render_per_element() {
        let job = raster::convert()
            .arg("input", "in.tif")
            .arg("output", "out.tif")
            .arg("creation-option", json!(["COMPRESS=LZW", "TILED=YES"]))
            .finish()
            .unwrap();
        let argv = job.to_argv();
        assert_eq!(
            argv.iter().filter(|t| *t == "--creation-option").count(),
            2
        );
    }

    #[test]
    fn test_info_streams_json() {
        let job = raster::info().arg("input", "in.tif").finish().unwrap();
        assert_eq!(job.stream_out_format, crate::job::StreamFormat::Json);
    }
}
