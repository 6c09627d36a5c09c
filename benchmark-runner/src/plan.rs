use benchmark_types::ConfigError;
use benchmark_types::Template;
use serde_yaml::Mapping;
use serde_yaml::Value;

pub const ZSTOR_SECTION: &str = "zstor_config";
pub const DEFAULT_DATA_BASE_PORT: u16 = 1200;
pub const DEFAULT_META_BASE_PORT: u16 = 1300;

/// What one scenario needs deployed locally.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DeploymentPlan {
  pub data_shards: usize,
  pub data_base_port: u16,
  pub meta_shards: usize,
  pub meta_base_port: u16,
}

fn count_field(section: &Mapping, field: &'static str) -> Result<usize, ConfigError> {
  let value = section.get(field).ok_or(ConfigError::MissingField {
    section: ZSTOR_SECTION,
    field,
  })?;
  value
    .as_u64()
    .and_then(|n| usize::try_from(n).ok())
    .ok_or(ConfigError::InvalidField {
      section: ZSTOR_SECTION,
      field,
    })
}

/// Accepts `host:port`, a bare `port`, or a bare integer.
fn parse_port(address: &Value) -> Result<u16, ConfigError> {
  let raw = match address {
    Value::String(s) => s.clone(),
    Value::Number(n) => n.to_string(),
    other => format!("{other:?}"),
  };
  let port = raw.rsplit(':').next().unwrap_or_default().trim();
  port.parse::<u16>().map_err(|_| ConfigError::InvalidPort {
    address: raw.clone(),
  })
}

fn base_port(section: &Mapping, field: &'static str, default: u16) -> Result<u16, ConfigError> {
  match section.get(field) {
    None | Some(Value::Null) => Ok(default),
    Some(Value::Sequence(addrs)) => match addrs.first() {
      None => Ok(default),
      Some(first) => parse_port(first),
    },
    Some(_) => Err(ConfigError::InvalidField {
      section: ZSTOR_SECTION,
      field,
    }),
  }
}

impl DeploymentPlan {
  /// Data shards are the distribution's data plus parity shards. Base ports come from the first declared address of each list.
  pub fn resolve(template: &Template) -> Result<DeploymentPlan, ConfigError> {
    let section = template
      .section(ZSTOR_SECTION)
      .ok_or(ConfigError::MissingField {
        section: "template",
        field: ZSTOR_SECTION,
      })?;
    let data_shards =
      count_field(section, "distribution_data")? + count_field(section, "distribution_parity")?;
    let meta_shards = count_field(section, "meta_shards_nr")?;
    Ok(DeploymentPlan {
      data_shards,
      data_base_port: base_port(section, "data_shards", DEFAULT_DATA_BASE_PORT)?,
      meta_shards,
      meta_base_port: base_port(section, "meta_shards", DEFAULT_META_BASE_PORT)?,
    })
  }
}

/// Points the scenario's storage client at the local deployment.
pub fn rewrite_addresses(
  template: &mut Template,
  data_addresses: &[String],
  meta_addresses: &[String],
) -> Result<(), ConfigError> {
  let section = template
    .section_mut(ZSTOR_SECTION)
    .ok_or(ConfigError::MissingField {
      section: "template",
      field: ZSTOR_SECTION,
    })?;
  let list = |addrs: &[String]| Value::Sequence(addrs.iter().cloned().map(Value::String).collect());
  section.insert(Value::from("data_shards"), list(data_addresses));
  section.insert(Value::from("meta_shards"), list(meta_addresses));
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::rewrite_addresses;
  use super::DeploymentPlan;
  use benchmark_types::ConfigError;
  use benchmark_types::Template;
  use serde_yaml::Value;

  fn template(zstor: &str) -> Template {
    let doc = format!("zstor_config:\n{zstor}\nbench_config:\n  value_size: 1\n");
    Template::from_value(serde_yaml::from_str(&doc).unwrap()).unwrap()
  }

  #[test]
  fn test_resolve_counts_and_ports() {
    let t = template(
      "  distribution_data: 3\n  distribution_parity: 1\n  meta_shards_nr: 2\n  data_shards: ['127.0.0.1:12345', '127.0.0.1:12346']\n  meta_shards: ['2379']\n",
    );
    assert_eq!(
      DeploymentPlan::resolve(&t).unwrap(),
      DeploymentPlan {
        data_shards: 4,
        data_base_port: 12345,
        meta_shards: 2,
        meta_base_port: 2379,
      }
    );
  }

  #[test]
  fn test_resolve_default_ports() {
    let t = template("  distribution_data: 1\n  distribution_parity: 0\n  meta_shards_nr: 1\n");
    let plan = DeploymentPlan::resolve(&t).unwrap();
    assert_eq!(plan.data_base_port, 1200);
    assert_eq!(plan.meta_base_port, 1300);
  }

  #[test]
  fn test_resolve_rejects_bad_input() {
    let t = template("  distribution_data: 1\n  meta_shards_nr: 1\n");
    assert!(matches!(
      DeploymentPlan::resolve(&t),
      Err(ConfigError::MissingField { field: "distribution_parity", .. })
    ));

    let t = template(
      "  distribution_data: 1\n  distribution_parity: 0\n  meta_shards_nr: 1\n  data_shards: ['localhost:http']\n",
    );
    assert!(matches!(
      DeploymentPlan::resolve(&t),
      Err(ConfigError::InvalidPort { address }) if address == "localhost:http"
    ));

    let t = template("  distribution_data: two\n  distribution_parity: 0\n  meta_shards_nr: 1\n");
    assert!(matches!(
      DeploymentPlan::resolve(&t),
      Err(ConfigError::InvalidField { field: "distribution_data", .. })
    ));
  }

  #[test]
  fn test_rewrite_addresses_keeps_key_order() {
    let mut t = template(
      "  data_shards: ['10.0.0.1:9000']\n  distribution_data: 1\n  meta_shards: ['10.0.0.2:2379']\n",
    );
    rewrite_addresses(
      &mut t,
      &["127.0.0.1:9000".to_string(), "127.0.0.1:9001".to_string()],
      &["127.0.0.1:2379".to_string()],
    )
    .unwrap();
    let section = t.section("zstor_config").unwrap();
    let keys = section
      .iter()
      .map(|(k, _)| k.as_str().unwrap().to_string())
      .collect::<Vec<_>>();
    assert_eq!(keys, vec!["data_shards", "distribution_data", "meta_shards"]);
    assert_eq!(
      section.get("data_shards"),
      Some(&Value::Sequence(vec![
        Value::from("127.0.0.1:9000"),
        Value::from("127.0.0.1:9001"),
      ]))
    );
  }
}
