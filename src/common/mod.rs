pub mod logging_setup;
pub mod timestamp_utils;
pub mod file_utils;

#[cfg(test)]
pub mod test_utils;
