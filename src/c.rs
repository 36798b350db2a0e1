// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use super::*;

use std::ffi::{c_char, CStr, CString, OsStr};
use std::mem::forget;
use std::os::unix::ffi::OsStrExt;
use std::ptr::null_mut;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(C)]
pub enum CStatus {
    Ok = 0,
    NotSupported = 1,
    MissingFiles = 2,
    Corrupt = 3,
    LoadFailed = 4,
    NoRoute = 5,
    OutOfCoverage = 6,
    NotLoaded = 7,
    Interrupted = 8,
    InvalidArgument = 9,
    PoiUnavailable = 10,
}

impl From<&UnavailableError> for CStatus {
    fn from(e: &UnavailableError) -> Self {
        match e {
            UnavailableError::NotSupported(_) => Self::NotSupported,
            UnavailableError::MissingFiles { .. } => Self::MissingFiles,
            UnavailableError::Corrupt { .. } => Self::Corrupt,
            UnavailableError::Load { .. } => Self::LoadFailed,
            UnavailableError::Interrupted { .. } => Self::Interrupted,
        }
    }
}

impl From<&Readiness> for CStatus {
    fn from(r: &Readiness) -> Self {
        match r {
            Readiness::Ready => Self::Ok,
            Readiness::MissingFiles(_) => Self::MissingFiles,
            Readiness::Corrupt(_) => Self::Corrupt,
        }
    }
}

impl From<&RouteError> for CStatus {
    fn from(e: &RouteError) -> Self {
        match e {
            RouteError::NoRoute => Self::NoRoute,
            RouteError::OutOfCoverage { .. } => Self::OutOfCoverage,
            RouteError::NotLoaded => Self::NotLoaded,
            RouteError::Interrupted | RouteError::Superseded => Self::Interrupted,
        }
    }
}

unsafe fn str_arg<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        None
    } else {
        CStr::from_ptr(ptr).to_str().ok()
    }
}

fn c_string(s: &str) -> *mut c_char {
    CString::new(s.replace('\0', ""))
        .unwrap_or_default()
        .into_raw()
}

unsafe fn free_c_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

/// Creates a navigator from a JSON config file, or from the default config
/// if `config_path` is NULL. Returns NULL if the config can't be read.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn cityroute_navigator_new(config_path: *const c_char) -> *mut Navigator {
    let config = if config_path.is_null() {
        Config::default()
    } else {
        let path = OsStr::from_bytes(CStr::from_ptr(config_path).to_bytes());
        match Config::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("{e}");
                return null_mut();
            }
        }
    };

    Box::into_raw(Box::new(Navigator::new(config)))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn cityroute_navigator_delete(ptr: *mut Navigator) {
    if !ptr.is_null() {
        drop(Box::from_raw(ptr));
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn cityroute_navigator_resolve_and_load(
    navigator: *const Navigator,
    city: *const c_char,
) -> CStatus {
    match (navigator.as_ref(), str_arg(city)) {
        (Some(navigator), Some(city)) => match navigator.resolve_and_load(city) {
            Ok(_) => CStatus::Ok,
            Err(e) => CStatus::from(&e),
        },
        _ => CStatus::InvalidArgument,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn cityroute_navigator_readiness(
    navigator: *const Navigator,
    city: *const c_char,
) -> CStatus {
    match (navigator.as_ref(), str_arg(city)) {
        (Some(navigator), Some(city)) => match navigator.readiness(city) {
            Ok(readiness) => CStatus::from(&readiness),
            Err(e) => CStatus::from(&e),
        },
        _ => CStatus::InvalidArgument,
    }
}

/// Returns true if any city was active.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn cityroute_navigator_unload(navigator: *const Navigator) -> bool {
    navigator.as_ref().is_some_and(|n| n.unload())
}

#[repr(C)]
pub struct CRoute {
    pub status: CStatus,

    pub coordinates: *mut Coordinate,
    pub coordinates_len: usize,
    pub coordinates_capacity: usize,

    /// NUL-terminated instruction texts.
    pub instructions: *mut *mut c_char,
    pub instructions_len: usize,
    pub instructions_capacity: usize,

    pub distance_m: f64,
    pub duration_s: f64,
}

impl CRoute {
    fn ok(result: RouteResult) -> Self {
        let mut coordinates = result.coordinates;
        let mut instructions: Vec<*mut c_char> = result
            .instructions
            .iter()
            .map(|i| c_string(&i.to_string()))
            .collect();

        let route = CRoute {
            status: CStatus::Ok,
            coordinates: coordinates.as_mut_ptr(),
            coordinates_len: coordinates.len(),
            coordinates_capacity: coordinates.capacity(),
            instructions: instructions.as_mut_ptr(),
            instructions_len: instructions.len(),
            instructions_capacity: instructions.capacity(),
            distance_m: result.distance_m,
            duration_s: result.duration_s,
        };
        forget(coordinates);
        forget(instructions);
        route
    }

    fn error(status: CStatus) -> Self {
        CRoute {
            status,
            coordinates: null_mut(),
            coordinates_len: 0,
            coordinates_capacity: 0,
            instructions: null_mut(),
            instructions_len: 0,
            instructions_capacity: 0,
            distance_m: 0.0,
            duration_s: 0.0,
        }
    }
}

/// Finds a route in the active city. The result must be freed with [cityroute_route_delete].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn cityroute_navigator_route(
    navigator: *const Navigator,
    start: Coordinate,
    destination: Coordinate,
) -> CRoute {
    match navigator.as_ref() {
        Some(navigator) => match navigator.query(start, destination) {
            Ok(result) => CRoute::ok(result),
            Err(e) => CRoute::error(CStatus::from(&e)),
        },
        None => CRoute::error(CStatus::InvalidArgument),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn cityroute_route_delete(route: CRoute) {
    if !route.coordinates.is_null() {
        drop(Vec::from_raw_parts(
            route.coordinates,
            route.coordinates_len,
            route.coordinates_capacity,
        ));
    }

    if !route.instructions.is_null() {
        let instructions = Vec::from_raw_parts(
            route.instructions,
            route.instructions_len,
            route.instructions_capacity,
        );
        for text in instructions {
            free_c_string(text);
        }
    }
}

#[repr(C)]
pub struct CPoi {
    pub id: i64,
    pub name: *mut c_char,
    pub city: *mut c_char,
    pub coordinate: Coordinate,
}

#[repr(C)]
pub struct CPoiList {
    pub status: CStatus,
    pub pois: *mut CPoi,
    pub len: usize,
    pub capacity: usize,
}

impl CPoiList {
    fn ok(pois: Vec<Poi>) -> Self {
        let mut pois: Vec<CPoi> = pois
            .into_iter()
            .map(|p| CPoi {
                id: p.id,
                name: c_string(&p.name),
                city: c_string(&p.city),
                coordinate: p.coordinate,
            })
            .collect();

        let list = CPoiList {
            status: CStatus::Ok,
            pois: pois.as_mut_ptr(),
            len: pois.len(),
            capacity: pois.capacity(),
        };
        forget(pois);
        list
    }

    fn error(status: CStatus) -> Self {
        CPoiList {
            status,
            pois: null_mut(),
            len: 0,
            capacity: 0,
        }
    }
}

/// Searches POIs by name or city. The result must be freed with [cityroute_poi_list_delete].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn cityroute_navigator_search(
    navigator: *const Navigator,
    text: *const c_char,
) -> CPoiList {
    match (navigator.as_ref(), str_arg(text)) {
        (Some(navigator), Some(text)) => match navigator.search(text) {
            Ok(pois) => CPoiList::ok(pois),
            Err(e) => {
                log::warn!("{e}");
                CPoiList::error(CStatus::PoiUnavailable)
            }
        },
        _ => CPoiList::error(CStatus::InvalidArgument),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn cityroute_poi_list_delete(list: CPoiList) {
    if !list.pois.is_null() {
        for poi in Vec::from_raw_parts(list.pois, list.len, list.capacity) {
            free_c_string(poi.name);
            free_c_string(poi.city);
        }
    }
}

/// Returns true if `position` is within `radius_m` meters of `destination`.
#[unsafe(no_mangle)]
pub extern "C" fn cityroute_has_arrived(
    position: Coordinate,
    destination: Coordinate,
    radius_m: f64,
) -> bool {
    earth_distance(position, destination) * 1000.0 <= radius_m
}

#[unsafe(no_mangle)]
pub extern "C" fn cityroute_earth_distance(a: Coordinate, b: Coordinate) -> f64 {
    earth_distance(a, b)
}
