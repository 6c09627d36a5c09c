use benchmark_types::BenchmarkPair;
use benchmark_types::ParameterSpec;

/// One labelled dimension of the throughput table. An unvaried axis has no id and a single blank value.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Axis {
  pub id: Option<String>,
  pub values: Vec<String>,
}

impl Axis {
  pub fn new(id: impl Into<String>, values: Vec<String>) -> Self {
    Self {
      id: Some(id.into()),
      values,
    }
  }

  pub fn unvaried() -> Self {
    Self {
      id: None,
      values: vec![String::new()],
    }
  }

  pub fn from_spec(spec: &ParameterSpec) -> Self {
    match &spec.id {
      None => Self::unvaried(),
      Some(id) => Self::new(id.clone(), spec.range.clone()),
    }
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  /// `id = value` for a varied axis, blank otherwise.
  pub fn label(&self, index: usize) -> String {
    match (&self.id, self.values.get(index)) {
      (Some(id), Some(value)) => format!("{id} = {value}"),
      _ => String::new(),
    }
  }
}

/// Throughput per (primary, secondary) cell of one run matrix, filled as runs complete.
#[derive(Clone, Debug)]
pub struct Aggregation {
  primary: Axis,
  secondary: Axis,
  // Indexed [secondary][primary], the order runs complete in.
  cells: Vec<Vec<Option<f64>>>,
}

impl Aggregation {
  pub fn new(primary: Axis, secondary: Axis) -> Self {
    let cells = vec![vec![None; primary.len()]; secondary.len()];
    Self {
      primary,
      secondary,
      cells,
    }
  }

  pub fn for_pair(pair: &BenchmarkPair) -> Self {
    Self::new(Axis::from_spec(&pair.primary), Axis::from_spec(&pair.secondary))
  }

  pub fn primary(&self) -> &Axis {
    &self.primary
  }

  pub fn secondary(&self) -> &Axis {
    &self.secondary
  }

  /// Returns false if the cell is outside the table.
  pub fn insert(&mut self, primary_index: usize, secondary_index: usize, throughput: f64) -> bool {
    match self
      .cells
      .get_mut(secondary_index)
      .and_then(|row| row.get_mut(primary_index))
    {
      Some(cell) => {
        *cell = Some(throughput);
        true
      }
      None => false,
    }
  }

  pub fn get(&self, primary_index: usize, secondary_index: usize) -> Option<f64> {
    self
      .cells
      .get(secondary_index)
      .and_then(|row| row.get(primary_index))
      .copied()
      .flatten()
  }

  /// Number of filled cells.
  pub fn run_count(&self) -> usize {
    self.cells.iter().flatten().filter(|c| c.is_some()).count()
  }

  /// Throughputs of one secondary value across the primary axis, with missing cells as zero.
  pub fn series(&self, secondary_index: usize) -> Vec<f64> {
    (0..self.primary.len())
      .map(|p| self.get(p, secondary_index).unwrap_or(0.0))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::Aggregation;
  use super::Axis;
  use benchmark_types::BenchmarkPair;
  use benchmark_types::ParameterSpec;

  #[test]
  fn test_grid_from_pair() {
    let pair = BenchmarkPair::new(
      ParameterSpec::new("block_size", vec!["1".into(), "2".into(), "3".into()]),
      ParameterSpec::new("clients", vec!["4".into(), "5".into()]),
    )
    .unwrap();
    let mut agg = Aggregation::for_pair(&pair);
    assert_eq!(agg.run_count(), 0);
    assert!(agg.insert(2, 1, 10.0));
    assert!(!agg.insert(3, 0, 1.0));
    assert!(!agg.insert(0, 2, 1.0));
    assert_eq!(agg.get(2, 1), Some(10.0));
    assert_eq!(agg.get(2, 0), None);
    assert_eq!(agg.series(1), vec![0.0, 0.0, 10.0]);
    assert_eq!(agg.run_count(), 1);
    assert_eq!(agg.secondary().label(1), "clients = 5");
  }

  #[test]
  fn test_unvaried_axes_make_one_cell() {
    let mut agg = Aggregation::for_pair(&BenchmarkPair::default());
    assert_eq!(agg.primary(), &Axis::unvaried());
    assert!(agg.insert(0, 0, 5.0));
    assert_eq!(agg.run_count(), 1);
    assert_eq!(agg.secondary().label(0), "");
  }
}
