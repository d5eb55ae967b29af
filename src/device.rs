//! Device identity: a stable pseudo-random id for this installation, used as
//! the partition key for every remote history operation.
//!
//! The id lives in a one-line file. If the file cannot be read or written the
//! process still gets an id; it just won't survive a restart.

use std::path::Path;

use rand::Rng;
use tracing::{info, instrument, warn};

use crate::util::now_ms;

const RANDOM_LEN: usize = 9;

/// Return the persisted id at `path`, creating and persisting one on first use.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn get_or_create_device_id(path: &Path) -> String {
  match std::fs::read_to_string(path) {
    Ok(s) if !s.trim().is_empty() => return s.trim().to_string(),
    Ok(_) => warn!(target: "bevuihoc_backend", "Device id file is empty; generating a new id"),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
    Err(e) => warn!(target: "bevuihoc_backend", error = %e, "Cannot read device id file; generating a new id"),
  }

  let id = new_device_id(now_ms());
  let write = path
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
    .map_or(Ok(()), std::fs::create_dir_all)
    .and_then(|_| std::fs::write(path, &id));
  match write {
    Ok(()) => info!(target: "bevuihoc_backend", device_id = %id, "Created device id"),
    Err(e) => warn!(target: "bevuihoc_backend", error = %e, device_id = %id, "Cannot persist device id; history is keyed to this session only"),
  }
  id
}

/// `user_` + random base36 chars + base36 of `millis`.
pub fn new_device_id(millis: i64) -> String {
  let mut rng = rand::thread_rng();
  let random: String = (0..RANDOM_LEN)
    .filter_map(|_| std::char::from_digit(rng.gen_range(0..36), 36))
    .collect();
  format!("user_{}{}", random, to_base36(millis.max(0) as u64))
}

fn to_base36(mut n: u64) -> String {
  if n == 0 {
    return "0".into();
  }
  let mut digits = Vec::new();
  while n > 0 {
    if let Some(c) = std::char::from_digit((n % 36) as u32, 36) {
      digits.push(c);
    }
    n /= 36;
  }
  digits.iter().rev().collect()
}
