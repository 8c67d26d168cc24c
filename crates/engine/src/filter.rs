//! Row predicates selecting the sample rows a pipeline consumes.

use loaddata_types::SampleRow;

use crate::expression::{CompiledExpression, ExprValue, ExpressionError};

/// Compiled pipeline filter. An empty source selects every row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowFilter {
    expression: Option<CompiledExpression>,
}

impl RowFilter {
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Ok(Self::select_all());
        }
        Ok(Self {
            expression: Some(CompiledExpression::parse(trimmed)?),
        })
    }

    pub fn select_all() -> Self {
        Self { expression: None }
    }

    pub fn is_select_all(&self) -> bool {
        self.expression.is_none()
    }

    /// Whether `sample` passes. Names resolve against the sample's fields only.
    pub fn matches(&self, sample: &SampleRow) -> Result<bool, ExpressionError> {
        let Some(expression) = &self.expression else {
            return Ok(true);
        };
        let value = expression.evaluate(|name| sample.field(name).as_ref().and_then(ExprValue::from_json))?;
        Ok(value.is_truthy())
    }

    /// Filter text as written, `None` when every row is selected.
    pub fn source(&self) -> Option<&str> {
        self.expression.as_ref().map(CompiledExpression::source)
    }

    pub fn names(&self) -> Vec<String> {
        self.expression.as_ref().map(CompiledExpression::names).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn sample(arm: &str, site: i64) -> SampleRow {
        SampleRow {
            path: "/images/a.tiff".into(),
            arm: arm.into(),
            batch: "Batch1".into(),
            plate: "Plate1".into(),
            well: "A1".into(),
            channels: "DNA".into(),
            site,
            cycle: 1,
            n_frames: 1,
            extra: IndexMap::new(),
        }
    }

    #[test]
    fn empty_filter_selects_everything() {
        let filter = RowFilter::parse("   ").expect("parse");
        assert!(filter.is_select_all());
        assert_eq!(filter.source(), None);
        assert_eq!(filter.matches(&sample("barcoding", 9)), Ok(true));
    }

    #[test]
    fn filters_by_arm_and_site() {
        let filter = RowFilter::parse("arm == 'painting' and site in [0, 2]").expect("parse");
        assert_eq!(filter.matches(&sample("painting", 2)), Ok(true));
        assert_eq!(filter.matches(&sample("painting", 1)), Ok(false));
        assert_eq!(filter.matches(&sample("barcoding", 0)), Ok(false));
        assert_eq!(filter.names(), vec!["arm", "site"]);
        assert_eq!(filter.source(), Some("arm == 'painting' and site in [0, 2]"));
    }

    #[test]
    fn unknown_field_is_an_error() {
        let filter = RowFilter::parse("magnification == '20X'").expect("parse");
        assert_eq!(
            filter.matches(&sample("painting", 0)),
            Err(ExpressionError::UnknownName("magnification".into()))
        );
    }
}
