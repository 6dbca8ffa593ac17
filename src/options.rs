//! The `-o key=val,key=val` mount-option grammar.
//!
//! Values are typed through a small coercion layer; `,`, `=`, `:` and space
//! are escapable with `\` so pattern lists and odd paths survive the shell.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::{self, MountConfig};
use crate::fs::symlink::SymlinkPolicy;

/// Errors produced while interpreting the option string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("option `{0}` is missing a value")]
    MissingValue(String),
    #[error("unknown option `{0}`")]
    UnknownKey(String),
    #[error("option `{0}` expects a {1} value")]
    BadValue(String, &'static str),
    #[error("at least -o root must be specified")]
    MissingRoot,
}

/// A coerced option value.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl OptionValue {
    fn coerce(raw: &str) -> Self {
        match raw {
            "true" | "True" => return OptionValue::Bool(true),
            "false" | "False" => return OptionValue::Bool(false),
            _ => {}
        }
        if let Ok(n) = raw.parse::<i64>() {
            return OptionValue::Int(n);
        }
        OptionValue::Str(raw.to_string())
    }

    fn as_bool(&self, key: &str) -> Result<bool, OptionsError> {
        match self {
            OptionValue::Bool(b) => Ok(*b),
            _ => Err(OptionsError::BadValue(key.to_string(), "boolean")),
        }
    }

    fn as_int(&self, key: &str) -> Result<i64, OptionsError> {
        match self {
            OptionValue::Int(n) => Ok(*n),
            _ => Err(OptionsError::BadValue(key.to_string(), "numeric")),
        }
    }

    fn as_str(&self, key: &str) -> Result<&str, OptionsError> {
        match self {
            OptionValue::Str(s) => Ok(s),
            _ => Err(OptionsError::BadValue(key.to_string(), "string")),
        }
    }
}

/// Split on `sep` wherever it is not preceded by a backslash.
fn split_escaped(input: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut prev_backslash = false;
    for c in input.chars() {
        if c == sep && !prev_backslash {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
        prev_backslash = c == '\\';
    }
    parts.push(current);
    parts
}

fn unescape(value: &str) -> String {
    value
        .replace("\\:", ":")
        .replace("\\,", ",")
        .replace("\\=", "=")
        .replace("\\ ", " ")
}

/// Parsed, typed mount options, ready to become a [`MountConfig`].
#[derive(Debug, Default)]
pub struct MountOptions {
    pub root: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub patterns: Vec<String>,
    pub uid: Option<i64>,
    pub gid: Option<i64>,
    pub foreground: Option<bool>,
    pub nothreads: Option<bool>,
    pub overwrite_rename_dest: Option<bool>,
    pub symlink_creation_windows: Option<SymlinkPolicy>,
    pub rellinks: Option<bool>,
    pub debug: Option<bool>,
    pub fusedebug: Option<bool>,
    pub log_in_file: Option<PathBuf>,
    pub log_in_console: Option<bool>,
    pub log_in_syslog: Option<bool>,
}

impl MountOptions {
    /// Parse a raw `-o` string.
    pub fn parse(raw: &str) -> Result<Self, OptionsError> {
        let mut options = MountOptions::default();
        for item in split_escaped(raw, ',') {
            if item.is_empty() {
                continue;
            }
            let mut kv = split_escaped(&item, '=');
            if kv.len() < 2 {
                return Err(OptionsError::MissingValue(item));
            }
            let key = kv.remove(0);
            // A value may itself contain escaped `=`.
            let raw_value = kv.join("=");
            options.set(&key, &raw_value)?;
        }
        Ok(options)
    }

    fn set(&mut self, key: &str, raw_value: &str) -> Result<(), OptionsError> {
        // Patterns keep their `\:` escapes until after the list split.
        if key == "patterns" {
            self.patterns = split_escaped(&raw_value.replace("\\ ", " "), ':')
                .into_iter()
                .map(|p| p.replace("\\:", ":"))
                .filter(|p| !p.is_empty())
                .collect();
            return Ok(());
        }

        let value = OptionValue::coerce(&unescape(raw_value));
        match key {
            "root" => self.root = Some(PathBuf::from(value.as_str(key)?)),
            "cache_dir" => self.cache_dir = Some(PathBuf::from(value.as_str(key)?)),
            "uid" => self.uid = Some(value.as_int(key)?),
            "gid" => self.gid = Some(value.as_int(key)?),
            "foreground" => self.foreground = Some(value.as_bool(key)?),
            "nothreads" => self.nothreads = Some(value.as_bool(key)?),
            "overwrite_rename_dest" => {
                self.overwrite_rename_dest = Some(value.as_bool(key)?);
            }
            "symlink_creation_windows" => {
                let name = value.as_str(key)?;
                let policy = SymlinkPolicy::parse(name)
                    .ok_or_else(|| OptionsError::BadValue(key.to_string(), "symlink policy"))?;
                self.symlink_creation_windows = Some(policy);
            }
            "rellinks" => self.rellinks = Some(value.as_bool(key)?),
            "debug" => self.debug = Some(value.as_bool(key)?),
            "fusedebug" => self.fusedebug = Some(value.as_bool(key)?),
            "log_in_file" => self.log_in_file = Some(PathBuf::from(value.as_str(key)?)),
            "log_in_console" => self.log_in_console = Some(value.as_bool(key)?),
            "log_in_syslog" => self.log_in_syslog = Some(value.as_bool(key)?),
            other => return Err(OptionsError::UnknownKey(other.to_string())),
        }
        Ok(())
    }

    /// Fold the options into a full configuration. `root` is mandatory.
    pub fn into_config(self, mount_point: PathBuf) -> Result<MountConfig, OptionsError> {
        let root = self.root.ok_or(OptionsError::MissingRoot)?;
        let cache_dir =
            self.cache_dir.unwrap_or_else(|| config::default_cache_dir(&root));
        let mut cfg = MountConfig::new(root, cache_dir, mount_point);
        cfg.patterns = self.patterns;
        if let Some(uid) = self.uid {
            cfg.uid = uid;
        }
        if let Some(gid) = self.gid {
            cfg.gid = gid;
        }
        if let Some(foreground) = self.foreground {
            cfg.foreground = foreground;
        }
        if let Some(nothreads) = self.nothreads {
            cfg.nothreads = nothreads;
        }
        if let Some(overwrite) = self.overwrite_rename_dest {
            cfg.overwrite_rename_dest = overwrite;
        }
        if let Some(policy) = self.symlink_creation_windows {
            cfg.symlink_policy = policy;
        }
        if let Some(rellinks) = self.rellinks {
            cfg.rellinks = rellinks;
        }
        if let Some(debug) = self.debug {
            cfg.debug = debug;
        }
        if let Some(fusedebug) = self.fusedebug {
            cfg.fusedebug = fusedebug;
        }
        cfg.log_in_file = self.log_in_file;
        if let Some(console) = self.log_in_console {
            cfg.log_in_console = console;
        }
        if let Some(syslog) = self.log_in_syslog {
            cfg.log_in_syslog = syslog;
        }
        Ok(cfg)
    }
}
