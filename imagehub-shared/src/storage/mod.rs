/// File storage for user uploads
///
/// - [`uploads`]: local [`uploads::FileStore`] with size and type rules

pub mod uploads;
