use super::Error;
use crate::jvm::class_file::Version;

pub struct Settings {
    /// Version of the class files produced
    ///
    /// Stack map tables are generated regardless, but only versions from Java 7 onward insist on
    /// them.
    pub version: Version,

    /// Name written into the `SourceFile` attribute of every class
    ///
    /// When unset, each class uses the source file name from its declaration (and classes
    /// without one get no `SourceFile` attribute).
    pub source_file: Option<String>,

    /// Call the no-argument constructor of the superclass from constructors which don't start
    /// with an explicit `this(..)` or `super(..)` call
    pub implicit_super_call: bool,

    /// Set `ACC_SUPER` on the classes produced
    ///
    /// Every compiler since Java 1.0.2 sets this flag and the JVM ignores it from Java 8 onward.
    pub class_access_super: bool,
}

impl Settings {
    pub fn new(source_file: Option<String>) -> Result<Settings, Error> {
        if let Some(name) = &source_file {
            if name.is_empty() || name.contains('/') {
                return Err(Error::MalformedName(name.clone()));
            }
        }

        Ok(Settings {
            version: Version::JAVA8,
            source_file,
            implicit_super_call: true,
            class_access_super: true,
        })
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            version: Version::JAVA8,
            source_file: None,
            implicit_super_call: true,
            class_access_super: true,
        }
    }
}
