use crate::series::DataPoint;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Partition {
    pub highlighted: Vec<DataPoint>,
    pub dimmed: Vec<DataPoint>,
}

/// Splits points by rule. With no selection everything is highlighted.
///
/// Purely presentational: callers decimate and compute scales on the full
/// point set before partitioning.
pub fn partition(points: &[DataPoint], selected_rule: Option<&str>) -> Partition {
    let Some(selected) = selected_rule else {
        return Partition {
            highlighted: points.to_vec(),
            dimmed: Vec::new(),
        };
    };

    let (highlighted, dimmed) = points
        .iter()
        .cloned()
        .partition(|p| p.rule.as_deref() == Some(selected));
    Partition { highlighted, dimmed }
}
