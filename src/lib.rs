pub mod alarm;
pub mod appsettings;
pub mod error;
pub mod notification;
pub mod occurrence;
pub mod scheduling;
pub mod service;
pub mod storage;

#[cfg(test)]
mod test_utils;
