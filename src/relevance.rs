//! Ground-truth judgments and query descriptors.
//!
//! A ground-truth directory holds, per query name:
//!
//! | File | Content |
//! |------|---------|
//! | `<name>_good.txt` | identifiers clearly showing the landmark |
//! | `<name>_ok.txt` | identifiers partially showing it |
//! | `<name>_junk.txt` | ambiguous identifiers, excluded from scoring |
//! | `<name>_query.txt` | `<source_image_id> <left> <top> <right> <bottom>` |
//!
//! `good ∪ ok` is the positive set. Anything listed as junk is ambiguous, even
//! if it is also listed as good or ok.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{EvalError, EvalResult};
use crate::gallery::Identifier;

/// Crop region in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BoundingBox {
    /// Integer pixel box, each coordinate truncated toward zero.
    ///
    /// Negative coordinates stay negative (`-3.7` becomes `-3`); clipping to
    /// the image is left to whoever crops.
    pub fn to_pixels(&self) -> (i32, i32, i32, i32) {
        let px = |v: f32| v.trunc() as i32;
        (px(self.left), px(self.top), px(self.right), px(self.bottom))
    }
}

/// One benchmark query: which image to crop, and where.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    /// Query name, e.g. `eiffel_3`.
    pub name: String,
    /// Gallery identifier of the source image.
    pub image: Identifier,
    pub bbox: BoundingBox,
}

/// How a ranked identifier counts toward a query's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Judgment {
    Positive,
    /// Skipped entirely: neither hit nor miss.
    Ambiguous,
    Negative,
}

/// Positive and ambiguous identifiers for one query.
#[derive(Debug, Clone, Default)]
pub struct RelevanceSets {
    pub positive: HashSet<Identifier>,
    pub ambiguous: HashSet<Identifier>,
}

impl RelevanceSets {
    pub fn new<P, A>(positive: P, ambiguous: A) -> Self
    where
        P: IntoIterator,
        P::Item: Into<Identifier>,
        A: IntoIterator,
        A::Item: Into<Identifier>,
    {
        Self {
            positive: positive.into_iter().map(Into::into).collect(),
            ambiguous: ambiguous.into_iter().map(Into::into).collect(),
        }
    }

    /// Judge one identifier. Ambiguous wins over positive.
    pub fn judge(&self, id: &str) -> Judgment {
        if self.ambiguous.contains(id) {
            Judgment::Ambiguous
        } else if self.positive.contains(id) {
            Judgment::Positive
        } else {
            Judgment::Negative
        }
    }

    /// Positives that are not also ambiguous.
    pub fn num_scorable_positives(&self) -> usize {
        self.positive.difference(&self.ambiguous).count()
    }
}

/// Reader for a ground-truth directory.
#[derive(Debug, Clone)]
pub struct GroundTruth {
    root: PathBuf,
}

impl GroundTruth {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load the judgment sets for `query_name`.
    ///
    /// Fails with [`EvalError::DataNotFound`] if any of the three lists is missing.
    pub fn resolve(&self, query_name: &str) -> EvalResult<RelevanceSets> {
        let good = self.load_list(query_name, "good")?;
        let ok = self.load_list(query_name, "ok")?;
        let junk = self.load_list(query_name, "junk")?;
        Ok(RelevanceSets::new(good.into_iter().chain(ok), junk))
    }

    /// Parse `<query_name>_query.txt`.
    pub fn query_spec(&self, query_name: &str) -> EvalResult<QuerySpec> {
        let path = self.path_for(query_name, "query");
        let lines = self.read_lines(&path)?;
        let parse_err = |reason: String| EvalError::Parse {
            path: path.clone(),
            reason,
        };

        let line = lines
            .first()
            .ok_or_else(|| parse_err("file is empty".to_string()))?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [image, coords @ ..] = fields.as_slice() else {
            return Err(parse_err("file is empty".to_string()));
        };
        if coords.len() != 4 {
            return Err(parse_err(format!(
                "expected `<image> <left> <top> <right> <bottom>`, got {} fields",
                fields.len()
            )));
        }

        let mut values = [0.0f32; 4];
        for (slot, raw) in values.iter_mut().zip(coords) {
            *slot = raw
                .parse()
                .map_err(|_| parse_err(format!("invalid coordinate '{raw}'")))?;
        }
        let [left, top, right, bottom] = values;

        Ok(QuerySpec {
            name: query_name.to_string(),
            image: image.to_string(),
            bbox: BoundingBox {
                left,
                top,
                right,
                bottom,
            },
        })
    }

    fn path_for(&self, query_name: &str, suffix: &str) -> PathBuf {
        self.root.join(format!("{query_name}_{suffix}.txt"))
    }

    fn load_list(&self, query_name: &str, suffix: &str) -> EvalResult<Vec<Identifier>> {
        self.read_lines(&self.path_for(query_name, suffix))
    }

    /// Trimmed, non-empty lines.
    fn read_lines(&self, path: &Path) -> EvalResult<Vec<String>> {
        let raw = std::fs::read_to_string(path).map_err(|e| EvalError::from_io(path, e))?;
        Ok(raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "eiffel_1_good.txt", "paris_eiffel_000001\nparis_eiffel_000002\n");
        write(dir.path(), "eiffel_1_ok.txt", "paris_eiffel_000002\nparis_eiffel_000003\n\n");
        write(dir.path(), "eiffel_1_junk.txt", "paris_eiffel_000009\n");
        write(
            dir.path(),
            "eiffel_1_query.txt",
            "paris_eiffel_000266 60.500000 35.100000 946.900000 707.000000\n",
        );
        dir
    }

    #[test]
    fn resolve_unions_good_and_ok() {
        let dir = fixture();
        let sets = GroundTruth::new(dir.path()).resolve("eiffel_1").unwrap();
        assert_eq!(sets.positive.len(), 3);
        assert!(sets.ambiguous.contains("paris_eiffel_000009"));
        assert_eq!(sets.judge("paris_eiffel_000003"), Judgment::Positive);
        assert_eq!(sets.judge("paris_eiffel_000009"), Judgment::Ambiguous);
        assert_eq!(sets.judge("paris_louvre_000001"), Judgment::Negative);
    }

    #[test]
    fn ambiguous_takes_precedence() {
        let sets = RelevanceSets::new(["a", "b"], ["b"]);
        assert_eq!(sets.judge("b"), Judgment::Ambiguous);
        assert_eq!(sets.num_scorable_positives(), 1);
    }

    #[test]
    fn missing_list_is_data_not_found() {
        let dir = fixture();
        fs::remove_file(dir.path().join("eiffel_1_ok.txt")).unwrap();
        let err = GroundTruth::new(dir.path()).resolve("eiffel_1").unwrap_err();
        match err {
            EvalError::DataNotFound { path } => assert!(path.ends_with("eiffel_1_ok.txt")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn parses_query_descriptor() {
        let dir = fixture();
        let spec = GroundTruth::new(dir.path()).query_spec("eiffel_1").unwrap();
        assert_eq!(spec.name, "eiffel_1");
        assert_eq!(spec.image, "paris_eiffel_000266");
        assert_eq!(spec.bbox.to_pixels(), (60, 35, 946, 707));
    }

    #[test]
    fn pixel_box_truncates_toward_zero() {
        let bbox = BoundingBox {
            left: -3.7,
            top: -0.5,
            right: 10.9,
            bottom: 5.2,
        };
        assert_eq!(bbox.to_pixels(), (-3, 0, 10, 5));
    }

    #[test]
    fn rejects_short_query_descriptor() {
        let dir = fixture();
        write(dir.path(), "eiffel_2_query.txt", "paris_eiffel_000266 1 2 3\n");
        let err = GroundTruth::new(dir.path()).query_spec("eiffel_2").unwrap_err();
        assert!(matches!(err, EvalError::Parse { .. }), "{err}");
    }
}
