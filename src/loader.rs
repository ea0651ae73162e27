//! Entry-point loading
//!
//! Resolves a service entry point of the form `<artifact>[,<version>]:<symbol>`
//! into a factory function. A bare artifact name is decorated into the
//! platform's shared-library filename; a name containing a path separator or
//! a dot is used verbatim.

use std::sync::Arc;

use libloading::Library;

use crate::communicator::Communicator;
use crate::service::{RawServiceFactory, Service, ServiceError};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("invalid entry point '{0}', expected <artifact>[,<version>]:<symbol>")]
    InvalidSpec(String),

    #[error("unable to open '{path}': {source}")]
    Open {
        path: String,
        source: libloading::Error,
    },

    #[error("unable to resolve symbol '{symbol}': {source}")]
    Symbol {
        symbol: String,
        source: libloading::Error,
    },
}

/// Resolves entry-point specs into loaded factories.
///
/// The production implementation is [`DynamicLoader`]. Embedding hosts (and
/// the test suite) can substitute their own resolution, e.g. to serve
/// statically linked services.
pub trait ArtifactLoader: Send + Sync {
    fn load_entry_point(&self, spec: &str) -> Result<LoadedEntry, LoadError>;
}

/// Keeps a loaded artifact mapped. Dropping the handle unloads the artifact,
/// so it must never be dropped while instances created from it are alive.
pub struct Artifact {
    _lib: Library,
}

type BoxedFactory =
    Box<dyn Fn(Arc<Communicator>) -> Result<Box<dyn Service>, ServiceError> + Send + Sync>;

enum Factory {
    /// C symbol resolved from a shared artifact.
    Symbol(RawServiceFactory),
    /// In-process factory, no artifact behind it.
    Boxed(BoxedFactory),
}

/// Why a factory invocation produced no service.
#[derive(Debug)]
pub enum FactoryError {
    /// The factory reported an error.
    Failed(ServiceError),
    /// The factory returned null; nothing more is known.
    Unknown,
}

/// A resolved entry point: the factory plus the artifact keeping it alive.
pub struct LoadedEntry {
    factory: Factory,
    artifact: Option<Artifact>,
}

impl std::fmt::Debug for LoadedEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedEntry").finish_non_exhaustive()
    }
}

impl LoadedEntry {
    /// Wrap an in-process factory. Used by hosts that link their services
    /// statically instead of loading artifacts.
    pub fn from_factory<F>(factory: F) -> Self
    where
        F: Fn(Arc<Communicator>) -> Result<Box<dyn Service>, ServiceError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            factory: Factory::Boxed(Box::new(factory)),
            artifact: None,
        }
    }

    /// Invoke the factory.
    pub fn instantiate(
        &self,
        communicator: &Arc<Communicator>,
    ) -> Result<Box<dyn Service>, FactoryError> {
        match &self.factory {
            Factory::Symbol(factory) => {
                let raw = unsafe { factory(communicator.as_ref()) };
                if raw.is_null() {
                    Err(FactoryError::Unknown)
                } else {
                    // The factory contract hands us ownership of the box.
                    Ok(unsafe { *Box::from_raw(raw) })
                }
            }
            Factory::Boxed(factory) => {
                factory(Arc::clone(communicator)).map_err(FactoryError::Failed)
            }
        }
    }

    /// Release the artifact handle to the caller. The caller is responsible
    /// for dropping it only after every instance created from it.
    pub fn into_artifact(self) -> Option<Artifact> {
        self.artifact
    }
}

/// Loads service artifacts with the platform dynamic linker.
#[derive(Debug, Default)]
pub struct DynamicLoader;

impl ArtifactLoader for DynamicLoader {
    fn load_entry_point(&self, spec: &str) -> Result<LoadedEntry, LoadError> {
        let (artifact, version, symbol) = parse_spec(spec)?;
        let path = artifact_file_name(artifact, version);

        let lib = unsafe { Library::new(&path) }.map_err(|source| LoadError::Open {
            path: path.clone(),
            source,
        })?;

        let name = format!("{}\0", symbol);
        let factory: RawServiceFactory = unsafe {
            *lib.get::<RawServiceFactory>(name.as_bytes())
                .map_err(|source| LoadError::Symbol {
                    symbol: symbol.to_string(),
                    source,
                })?
        };

        Ok(LoadedEntry {
            factory: Factory::Symbol(factory),
            artifact: Some(Artifact { _lib: lib }),
        })
    }
}

/// Split `<artifact>[,<version>]:<symbol>` at the last colon, so artifact
/// names that are absolute Windows paths keep their drive colon.
fn parse_spec(spec: &str) -> Result<(&str, Option<&str>, &str), LoadError> {
    let invalid = || LoadError::InvalidSpec(spec.to_string());

    let colon = spec.rfind(':').ok_or_else(invalid)?;
    let (artifact, symbol) = (&spec[..colon], &spec[colon + 1..]);
    if artifact.is_empty() || symbol.is_empty() {
        return Err(invalid());
    }

    match artifact.split_once(',') {
        Some((name, version)) => {
            if name.is_empty() || version.is_empty() {
                Err(invalid())
            } else {
                Ok((name, Some(version), symbol))
            }
        }
        None => Ok((artifact, None, symbol)),
    }
}

/// Decorate a bare artifact name into the platform library filename. Names
/// that already look like files or paths pass through unchanged.
fn artifact_file_name(artifact: &str, version: Option<&str>) -> String {
    if artifact.contains('/') || artifact.contains('\\') || artifact.contains('.') {
        return artifact.to_string();
    }

    if cfg!(target_os = "windows") {
        match version {
            Some(v) => format!("{}{}.dll", artifact, v),
            None => format!("{}.dll", artifact),
        }
    } else if cfg!(target_os = "macos") {
        match version {
            Some(v) => format!("lib{}.{}.dylib", artifact, v),
            None => format!("lib{}.dylib", artifact),
        }
    } else {
        match version {
            Some(v) => format!("lib{}.so.{}", artifact, v),
            None => format!("lib{}.so", artifact),
        }
    }
}
