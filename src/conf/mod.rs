//! Configuration of the authentication backend and helpers to load it.
mod loading;
mod object;

pub use self::loading::load;
pub use self::loading::ConfigFileDecode;
pub use self::loading::ConfigFileNotFound;
pub use self::loading::ConfigFileRead;
pub use self::object::Configuration;
pub use self::object::DirectoryConf;
pub use self::object::KeyUsage;
