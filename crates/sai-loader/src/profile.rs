//! Switch profile services handed to `sai_api_initialize`.
//!
//! A profile is a `key=value` file (`sai.profile`). The parsed map is
//! published with [`install`] and read back by the vendor library through
//! the two callbacks in [`SERVICE_METHOD_TABLE`].

use std::collections::BTreeMap;
use std::ffi::{c_char, c_int, CStr, CString};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use once_cell::sync::Lazy;

use crate::error::{ProfileError, ProfileResult};
use crate::marshal::{CType, CallbackSignature};

/// `sai_switch_profile_id_t`
pub type SwitchProfileId = u32;

/// `sai_profile_get_value_fn`
pub type ProfileGetValueFn =
    unsafe extern "C" fn(profile_id: SwitchProfileId, variable: *const c_char) -> *const c_char;

/// `sai_profile_get_next_value_fn`
pub type ProfileGetNextValueFn = unsafe extern "C" fn(
    profile_id: SwitchProfileId,
    variable: *mut *const c_char,
    value: *mut *const c_char,
) -> c_int;

/// `sai_service_method_table_t`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ServiceMethodTable {
    pub profile_get_value: Option<ProfileGetValueFn>,
    pub profile_get_next_value: Option<ProfileGetNextValueFn>,
}

/// Services backed by the installed profile.
pub static SERVICE_METHOD_TABLE: ServiceMethodTable = ServiceMethodTable {
    profile_get_value: Some(profile_get_value),
    profile_get_next_value: Some(profile_get_next_value),
};

pub fn service_method_table() -> &'static ServiceMethodTable {
    &SERVICE_METHOD_TABLE
}

/// Declared signatures of the service callbacks.
pub fn service_signatures() -> [(&'static str, CallbackSignature); 2] {
    [
        (
            "profile_get_value",
            CallbackSignature::declare(CType::CharPtr, vec![CType::U32, CType::CharPtr]),
        ),
        (
            "profile_get_next_value",
            CallbackSignature::declare(
                CType::I32,
                vec![
                    CType::U32,
                    CType::pointer_to(CType::CharPtr),
                    CType::pointer_to(CType::CharPtr),
                ],
            ),
        ),
    ]
}

/// Ordered profile key/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileMap {
    entries: BTreeMap<String, String>,
}

impl ProfileMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses profile text.
    ///
    /// Lines starting with `#` or `;` are comments. The key is everything
    /// before the first `=`, the value everything after it. Later
    /// duplicates replace earlier ones.
    pub fn parse(text: &str) -> Self {
        let mut map = Self::new();
        for line in text.lines() {
            if line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            match line.split_once('=') {
                Some((key, value)) => {
                    debug!("Profile entry {}={}", key, value);
                    map.insert(key, value);
                }
                None if line.is_empty() => {}
                None => warn!("Skipping profile line without '=': {}", line),
            }
        }
        map
    }

    /// Reads and parses a profile file.
    pub fn load(path: &Path) -> ProfileResult<Self> {
        let text = fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let map = Self::parse(&text);
        info!("Loaded {} profile entries from {}", map.len(), path.display());
        Ok(map)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[derive(Debug, Default)]
struct ProfileStore {
    entries: Vec<(CString, CString)>,
    cursor: usize,
}

static PROFILE: Lazy<Mutex<ProfileStore>> = Lazy::new(|| Mutex::new(ProfileStore::default()));

fn store() -> MutexGuard<'static, ProfileStore> {
    PROFILE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Publishes `map` to the service callbacks and resets enumeration.
///
/// Pointers handed out for a previous map become invalid.
pub fn install(map: &ProfileMap) -> ProfileResult<()> {
    let entries = map
        .iter()
        .map(|(key, value)| {
            let nul = || ProfileError::InteriorNul {
                key: key.to_string(),
            };
            Ok((
                CString::new(key).map_err(|_| nul())?,
                CString::new(value).map_err(|_| nul())?,
            ))
        })
        .collect::<ProfileResult<Vec<_>>>()?;

    let mut store = store();
    store.entries = entries;
    store.cursor = 0;
    debug!("Installed {} profile entries", store.entries.len());
    Ok(())
}

/// The currently installed profile.
pub fn installed() -> ProfileMap {
    let store = store();
    let mut map = ProfileMap::new();
    for (key, value) in &store.entries {
        map.insert(key.to_string_lossy(), value.to_string_lossy());
    }
    map
}

/// Value for `variable`, or null when unknown.
///
/// # Safety
///
/// A non-null `variable` must point to a NUL-terminated string.
pub unsafe extern "C" fn profile_get_value(
    _profile_id: SwitchProfileId,
    variable: *const c_char,
) -> *const c_char {
    if variable.is_null() {
        debug!("profile_get_value called with null variable");
        return std::ptr::null();
    }
    let variable = CStr::from_ptr(variable);
    let store = store();
    match store.entries.iter().find(|(key, _)| key.as_c_str() == variable) {
        Some((_, value)) => value.as_ptr(),
        None => {
            debug!("{}: NULL", variable.to_string_lossy());
            std::ptr::null()
        }
    }
}

/// Enumerates the installed pairs.
///
/// A null `value` restarts enumeration and returns 0. Returns -1 when
/// `variable` is null or the end is reached, otherwise writes the next pair
/// and returns 0.
///
/// # Safety
///
/// Non-null `variable` and `value` must be valid for writes.
pub unsafe extern "C" fn profile_get_next_value(
    _profile_id: SwitchProfileId,
    variable: *mut *const c_char,
    value: *mut *const c_char,
) -> c_int {
    let mut store = store();
    if value.is_null() {
        debug!("Resetting profile map iterator");
        store.cursor = 0;
        return 0;
    }
    if variable.is_null() {
        debug!("profile_get_next_value called with null variable");
        return -1;
    }
    let Some((key, val)) = store.entries.get(store.cursor) else {
        debug!("Profile iterator reached end");
        return -1;
    };
    *variable = key.as_ptr();
    *value = val.as_ptr();
    store.cursor += 1;
    0
}
