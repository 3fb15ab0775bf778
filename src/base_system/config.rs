//! 配置文件读写：缺省生成带注释的 YAML，读取时与默认值合并。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot access {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("{path} is not valid YAML: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("config value has wrong type: {0}")]
    Shape(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Validation(String),
}

/// 配置项在文件里的注释说明。
#[derive(Debug, Clone, Copy)]
pub struct FieldMeta {
    pub name: &'static str,
    pub description: &'static str,
}

pub trait ConfigSpec: Serialize + DeserializeOwned + Default {
    const FILE_NAME: &'static str;

    /// 文件中的字段顺序即此列表的顺序。
    fn fields() -> &'static [FieldMeta];

    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// 读取配置；文件不存在时写入默认配置。
///
/// `base_dir` 为 None 时使用当前目录。用户文件缺少的字段用默认值补齐并回写，
/// 已写的值保持不变。
pub fn load_or_create<T: ConfigSpec>(base_dir: Option<&Path>) -> Result<T, ConfigError> {
    let path = base_dir.unwrap_or(Path::new("")).join(T::FILE_NAME);

    let Some(user) = read_user_yaml(&path)? else {
        let config = T::default();
        save(&config, &path)?;
        info!("已生成默认配置文件: {}", path.display());
        return Ok(config);
    };

    let missing: Vec<&str> = T::fields()
        .iter()
        .map(|f| f.name)
        .filter(|name| !has_key(&user, name))
        .collect();

    let mut merged = serde_yaml::to_value(T::default())?;
    overlay(&mut merged, user);
    let config: T = serde_yaml::from_value(merged)?;
    config.validate()?;

    if !missing.is_empty() {
        debug!("配置文件缺少 {:?}，已用默认值补齐", missing);
        save(&config, &path)?;
    }
    Ok(config)
}

/// 写出带注释的配置文件。
pub fn save<T: ConfigSpec>(config: &T, path: &Path) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, render_commented(config)?).map_err(io_err)
}

pub fn render_commented<T: ConfigSpec>(config: &T) -> Result<String, ConfigError> {
    let Value::Mapping(values) = serde_yaml::to_value(config)? else {
        return Err(ConfigError::Validation("config is not a mapping".into()));
    };

    let mut out = String::new();
    for field in T::fields() {
        for line in field.description.lines() {
            out.push_str("# ");
            out.push_str(line);
            out.push('\n');
        }
        let key = Value::String(field.name.into());
        let value = values.get(&key).cloned().unwrap_or(Value::Null);
        out.push_str(&serde_yaml::to_string(&Mapping::from_iter([(key, value)]))?);
        out.push('\n');
    }
    Ok(out)
}

fn read_user_yaml(path: &Path) -> Result<Option<Value>, ConfigError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_yaml::from_str(&raw)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

fn has_key(user: &Value, name: &str) -> bool {
    user.as_mapping()
        .is_some_and(|map| map.contains_key(Value::String(name.into())))
}

/// 把用户值叠加到默认值上；用户写 `~` 或空文件时保留默认。
fn overlay(base: &mut Value, user: Value) {
    match (base, user) {
        (_, Value::Null) => {}
        (Value::Mapping(base), Value::Mapping(user)) => {
            for (key, value) in user {
                match base.get_mut(&key) {
                    Some(slot) => overlay(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
