pub mod decode;
pub mod preview;
pub mod timezones;
pub mod watch;
