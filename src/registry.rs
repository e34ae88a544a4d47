//! Format registry and codec factories
//!
//! A [`Registry`] binds [`Format`] descriptors to [`CodecFactory`]
//! implementations. Parsers are resolved by byte signature (see
//! [`crate::resolver`]), writers by file extension.

use std::collections::BTreeSet;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;

use crate::codec::BuiltinCodec;
use crate::error::{Result, SheetError};
use crate::input::Input;
use crate::options::Options;
use crate::parser::SpreadsheetParser;
use crate::resolver::MixedFactory;
use crate::writer::SpreadsheetWriter;

/// Descriptor of one file format.
///
/// Two descriptors are equal when their signature and extension set are
/// equal; the display name does not take part.
#[derive(Debug, Clone, Eq)]
pub struct Format {
    name: String,
    signature: Vec<u8>,
    extensions: BTreeSet<String>,
}

impl Format {
    /// An empty `signature` matches any input and ranks last
    pub fn new(name: &str, signature: &[u8], extensions: &[&str]) -> Self {
        Format {
            name: name.to_string(),
            signature: signature.to_vec(),
            extensions: extensions.iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }

    /// Case-insensitive extension test; a leading dot is ignored
    pub fn has_extension(&self, extension: &str) -> bool {
        let extension = extension.trim_start_matches('.').to_lowercase();
        self.extensions.contains(&extension)
    }
}

impl PartialEq for Format {
    fn eq(&self, other: &Self) -> bool {
        self.signature == other.signature && self.extensions == other.extensions
    }
}

impl Hash for Format {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.signature.hash(state);
        self.extensions.hash(state);
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Opens parsers and writers for the formats it declares
pub trait CodecFactory: Send + Sync {
    fn supported_formats(&self) -> Vec<Format>;

    /// Open a parser over `input`; malformed content fails with `FormatDecode`
    fn open_read<'a>(&self, input: Input<'a>, options: &Options) -> Result<SpreadsheetParser<'a>>;

    /// Open a writer emitting to `output`
    fn open_write<'a>(
        &self,
        output: Box<dyn Write + 'a>,
        options: &Options,
    ) -> Result<SpreadsheetWriter<'a>>;
}

type SharedFactory = Arc<dyn CodecFactory>;

/// Registered factories, indexed by signature and by extension
pub struct Registry {
    entries: Vec<(Format, SharedFactory)>,
    by_signature: IndexMap<Vec<u8>, Vec<SharedFactory>>,
    by_extension: IndexMap<String, Vec<SharedFactory>>,
}

impl Registry {
    /// Build a registry from `factories`, registered in order
    pub fn new<I>(factories: I) -> Self
    where
        I: IntoIterator<Item = SharedFactory>,
    {
        let mut registry = Registry {
            entries: Vec::new(),
            by_signature: IndexMap::new(),
            by_extension: IndexMap::new(),
        };
        for factory in factories {
            registry.register(factory);
        }
        registry
    }

    /// The built-in XLS, XLSX and CSV codecs
    pub fn builtin() -> Self {
        Registry::new(
            BuiltinCodec::ALL
                .into_iter()
                .map(|codec| Arc::new(codec) as SharedFactory),
        )
    }

    /// Add `factory` under every format it declares
    pub fn register(&mut self, factory: SharedFactory) {
        for format in factory.supported_formats() {
            log::debug!("registering codec for {}", format);
            self.by_signature
                .entry(format.signature().to_vec())
                .or_default()
                .push(factory.clone());
            for extension in format.extensions() {
                self.by_extension
                    .entry(extension.to_string())
                    .or_default()
                    .push(factory.clone());
            }
            self.entries.push((format, factory.clone()));
        }
    }

    /// Distinct formats in registration order
    pub fn formats(&self) -> Vec<Format> {
        let mut formats: Vec<Format> = Vec::new();
        for (format, _) in &self.entries {
            if !formats.contains(format) {
                formats.push(format.clone());
            }
        }
        formats
    }

    /// Factories registered under `signature`, in registration order
    pub fn factories_for_signature(&self, signature: &[u8]) -> &[SharedFactory] {
        self.by_signature
            .get(signature)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First factory registered for `extension`
    pub fn resolve_writer(&self, extension: &str) -> Result<SharedFactory> {
        let key = extension.trim_start_matches('.').to_lowercase();
        self.by_extension
            .get(&key)
            .and_then(|factories| factories.first())
            .cloned()
            .ok_or_else(|| {
                SheetError::NoFactoryFound(format!("no writer registered for '{}'", extension))
            })
    }

    /// Composite parser factory over the formats matching `extensions`.
    ///
    /// An empty slice selects every registered format.
    pub fn resolve_parser(&self, extensions: &[&str]) -> Result<MixedFactory> {
        let candidates: Vec<(Format, SharedFactory)> = self
            .entries
            .iter()
            .filter(|(format, _)| {
                extensions.is_empty() || extensions.iter().any(|ext| format.has_extension(ext))
            })
            .cloned()
            .collect();

        if candidates.is_empty() {
            return Err(SheetError::NoFactoryFound(format!(
                "no parser registered for {:?}",
                extensions
            )));
        }
        Ok(MixedFactory::new(candidates))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::builtin()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("formats", &self.formats())
            .finish()
    }
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// The process-wide registry, built from the built-in codecs on first use
pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::builtin)
}

/// Publish `registry` as the process-wide registry.
///
/// Must happen before the first call to [`registry`]; afterwards the
/// rejected registry is handed back.
pub fn install(registry: Registry) -> std::result::Result<(), Registry> {
    REGISTRY.set(registry)
}

/// Open a parser, detecting the format from the leading bytes
pub fn open<'a, R: std::io::BufRead + 'a>(reader: R) -> Result<SpreadsheetParser<'a>> {
    open_with(Input::buffered(reader), &Options::new())
}

/// Open a parser over any input with codec options
pub fn open_with<'a>(input: Input<'a>, options: &Options) -> Result<SpreadsheetParser<'a>> {
    registry().resolve_parser(&[])?.open_read(input, options)
}

/// Open a parser over a file.
///
/// The extension narrows the candidates; an unknown extension falls back
/// to every registered format.
pub fn open_path<P: AsRef<Path>>(path: P) -> Result<SpreadsheetParser<'static>> {
    let path = path.as_ref();
    let file = BufReader::new(File::open(path)?);
    let extension = extension_of(path);

    let factory = match extension.as_deref() {
        Some(ext) => match registry().resolve_parser(&[ext]) {
            Err(SheetError::NoFactoryFound(_)) => {
                log::debug!("unknown extension '{}', trying every format", ext);
                registry().resolve_parser(&[])?
            }
            other => other?,
        },
        None => registry().resolve_parser(&[])?,
    };
    factory.open_read(Input::buffered(file), &Options::new())
}

/// Open a writer for `extension` over `writer`
pub fn create<'a, W: Write + 'a>(writer: W, extension: &str) -> Result<SpreadsheetWriter<'a>> {
    create_with(writer, extension, &Options::new())
}

pub fn create_with<'a, W: Write + 'a>(
    writer: W,
    extension: &str,
    options: &Options,
) -> Result<SpreadsheetWriter<'a>> {
    registry()
        .resolve_writer(extension)?
        .open_write(Box::new(writer), options)
}

/// Create a file and open a writer chosen by its extension
pub fn create_path<P: AsRef<Path>>(path: P) -> Result<SpreadsheetWriter<'static>> {
    let path = path.as_ref();
    let extension = extension_of(path).ok_or_else(|| {
        SheetError::NoFactoryFound(format!("'{}' has no file extension", path.display()))
    })?;
    let factory = registry().resolve_writer(&extension)?;
    let file = BufWriter::new(File::create(path)?);
    factory.open_write(Box::new(file), &Options::new())
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_equality_ignores_name() {
        let a = Format::new("Excel 2007", b"PK\x03\x04", &["XLSX"]);
        let b = Format::new("xlsx", b"PK\x03\x04", &["xlsx"]);
        let c = Format::new("xlsx", b"PK\x03\x04", &["xlsx", "xlsm"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.has_extension(".Xlsx"));
    }

    #[test]
    fn test_builtin_registry() {
        let registry = Registry::builtin();
        let names: Vec<_> = registry
            .formats()
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        assert_eq!(names, vec!["xls", "xlsx", "csv"]);

        let xlsx = registry.resolve_writer("XLSX").unwrap();
        assert_eq!(xlsx.supported_formats(), vec![Format::xlsx()]);
        assert_eq!(registry.factories_for_signature(b"").len(), 1);
        assert!(matches!(
            registry.resolve_writer("ods"),
            Err(SheetError::NoFactoryFound(_))
        ));
    }

    #[test]
    fn test_resolve_parser_filters_by_extension() {
        let registry = Registry::builtin();
        assert_eq!(registry.resolve_parser(&[]).unwrap().formats().len(), 3);
        assert_eq!(
            registry.resolve_parser(&["csv", "xls"]).unwrap().formats(),
            vec![Format::xls(), Format::csv()]
        );
        assert!(matches!(
            registry.resolve_parser(&["ods"]),
            Err(SheetError::NoFactoryFound(_))
        ));
    }

    #[test]
    fn test_register_keeps_order_per_signature() {
        let mut registry = Registry::new(Vec::<SharedFactory>::new());
        assert!(registry.formats().is_empty());
        registry.register(Arc::new(BuiltinCodec::Csv));
        registry.register(Arc::new(BuiltinCodec::Xlsx));
        assert_eq!(registry.formats(), vec![Format::csv(), Format::xlsx()]);
        assert_eq!(registry.factories_for_signature(b"PK\x03\x04").len(), 1);
    }
}
