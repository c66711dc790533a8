//! Instrumentation of static assemblies.
//!
//! Two strategies turn a [`StaticAssembly`] into an interceptable live assembly:
//!
//! - [`Strategy::Dynamic`] builds a fresh live assembly from the selected types only, weaving
//!   a clone of the source on the way. Nothing is written to disk.
//! - [`Strategy::StaticRewrite`] weaves the selected types of the source in place, encodes the
//!   rewritten image and loads every type of it. The image can be saved as well.
//!
//! Both go through the same pieces: the [`SymbolResolver`] maps symbolic references to live
//! handles, the [`Transcoder`] rewrites method bodies, the [`StagedModuleBuilder`] orders the
//! work over the [`DeferredActions`] queues and the weaver adds the stub slots and redirects.
//!
//! # Example
//!
//! ```rust,no_run
//! use dotweave::{Domain, Instrumenter, TypeFilter};
//! use std::path::Path;
//!
//! let domain = Domain::new()?;
//! let instrumenter = Instrumenter::new(TypeFilter::name_contains("Sample"));
//! let assembly = instrumenter.instrument_and_load(
//!     &domain,
//!     Some(Path::new("Samples.dll")),
//!     Some(Path::new("Samples.woven.dll")),
//! )?;
//! println!("Loaded {} types", assembly.types().len());
//! # Ok::<(), dotweave::Error>(())
//! ```

mod attributes;
mod builder;
mod passes;
mod resolver;
mod transcoder;
mod weaver;

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, warn};
use rayon::prelude::*;

pub use attributes::AttributeTranslator;
pub use builder::StagedModuleBuilder;
pub use passes::{Action, DeferredActions, Phase};
pub use resolver::{GenericContext, SymbolResolver, MAX_RESOLUTION_DEPTH};
pub use transcoder::{transcode, Transcoder};
pub use weaver::{fast_path_length, is_weavable, weave, weave_module};

use crate::{
    emit::LoadedAssembly,
    metadata::definitions::{StaticAssembly, TypeDefinition},
    runtime::Domain,
    Error, Result,
};

type Predicate = dyn Fn(&TypeDefinition) -> bool + Send + Sync;

/// Selects the top-level types an operation works on.
///
/// Nested types follow their enclosing type.
#[derive(Clone)]
pub struct TypeFilter {
    description: String,
    predicate: Arc<Predicate>,
}

impl TypeFilter {
    /// Every type.
    #[must_use]
    pub fn all() -> Self {
        TypeFilter {
            description: "all types".to_string(),
            predicate: Arc::new(|_| true),
        }
    }

    /// Types whose full name contains `fragment`.
    #[must_use]
    pub fn name_contains(fragment: impl Into<String>) -> Self {
        let fragment = fragment.into();
        TypeFilter {
            description: format!("names containing {fragment:?}"),
            predicate: Arc::new(move |ty| ty.full_name().contains(fragment.as_str())),
        }
    }

    /// Types accepted by `predicate`.
    #[must_use]
    pub fn custom(
        description: impl Into<String>,
        predicate: impl Fn(&TypeDefinition) -> bool + Send + Sync + 'static,
    ) -> Self {
        TypeFilter {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// `true` if `ty` is selected.
    #[must_use]
    pub fn matches(&self, ty: &TypeDefinition) -> bool {
        (self.predicate)(ty)
    }
}

impl fmt::Debug for TypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeFilter").field(&self.description).finish()
    }
}

/// How an assembly is made interceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum Strategy {
    /// Build a new live assembly from the selected types
    Dynamic,
    /// Rewrite the static assembly in place, then load all of it
    #[default]
    StaticRewrite,
}

/// Options of an [`Instrumenter`].
#[derive(Debug, Clone)]
pub struct InstrumentOptions {
    /// The strategy, [`Strategy::StaticRewrite`] by default
    pub strategy: Strategy,
    /// The types to instrument
    pub include: TypeFilter,
    /// Weave selected methods; without it the selected types are only rebuilt
    pub weave: bool,
    /// Extra directories searched for referenced assemblies
    pub search_paths: Vec<PathBuf>,
    /// Bound on nested type shapes and base chains
    pub max_resolution_depth: usize,
}

impl InstrumentOptions {
    /// Default options over the types selected by `include`.
    #[must_use]
    pub fn new(include: TypeFilter) -> Self {
        InstrumentOptions {
            strategy: Strategy::default(),
            include,
            weave: true,
            search_paths: Vec::new(),
            max_resolution_depth: MAX_RESOLUTION_DEPTH,
        }
    }

    /// Use `strategy`.
    #[must_use]
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Turn weaving on or off.
    #[must_use]
    pub fn weave(mut self, weave: bool) -> Self {
        self.weave = weave;
        self
    }

    /// Add a directory searched for referenced assemblies.
    #[must_use]
    pub fn search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    /// Bound recursive resolution at `depth` levels.
    #[must_use]
    pub fn max_resolution_depth(mut self, depth: usize) -> Self {
        self.max_resolution_depth = depth;
        self
    }
}

/// Front end of the instrumentation pipeline.
#[derive(Debug, Clone)]
pub struct Instrumenter {
    options: InstrumentOptions,
}

impl Instrumenter {
    /// An instrumenter with default options over the types selected by `include`.
    #[must_use]
    pub fn new(include: TypeFilter) -> Self {
        Instrumenter {
            options: InstrumentOptions::new(include),
        }
    }

    /// An instrumenter with explicit options.
    #[must_use]
    pub fn with_options(options: InstrumentOptions) -> Self {
        Instrumenter { options }
    }

    /// The options in effect.
    #[must_use]
    pub fn options(&self) -> &InstrumentOptions {
        &self.options
    }

    /// Read the assembly at `source`, instrument it and register the result in `domain`.
    ///
    /// With [`Strategy::StaticRewrite`] the rewritten image is also written to `output`, once
    /// it has been built successfully. [`Strategy::Dynamic`] ignores `output`.
    ///
    /// # Errors
    /// Returns [`Error::MissingArgument`] without a `source`, read errors of the image
    /// unchanged, and any weaving, resolution or transcoding error. Nothing is written or
    /// registered on error.
    pub fn instrument_and_load(
        &self,
        domain: &Domain,
        source: Option<&Path>,
        output: Option<&Path>,
    ) -> Result<Arc<LoadedAssembly>> {
        let source = source.ok_or(Error::MissingArgument("source"))?;
        let assembly = StaticAssembly::from_file(source)?;
        debug!("Instrumenting {} with {}", source.display(), self.options.strategy);

        let (live, image) = self.build(domain, &assembly)?;
        match (output, image) {
            (Some(path), Some(image)) => {
                crate::file::write_file(path, &image)?;
                debug!("Saved rewritten image to {}", path.display());
            }
            (Some(path), None) => warn!("Dynamic instrumentation does not save {}", path.display()),
            _ => {}
        }
        domain.register(live)
    }

    /// Instrument an assembly already in memory and register the result in `domain`.
    ///
    /// # Errors
    /// See [`Instrumenter::instrument_and_load`].
    pub fn instrument(&self, domain: &Domain, assembly: &StaticAssembly) -> Result<Arc<LoadedAssembly>> {
        let (live, _) = self.build(domain, assembly)?;
        domain.register(live)
    }

    /// Instrument several assemblies in parallel.
    ///
    /// Builds share nothing but `domain`; each result stands on its own.
    pub fn instrument_all(&self, domain: &Domain, sources: &[PathBuf]) -> Vec<Result<Arc<LoadedAssembly>>> {
        sources
            .par_iter()
            .map(|source| self.instrument_and_load(domain, Some(source), None))
            .collect()
    }

    /// Build without registering. Returns the encoded image for the static strategy.
    fn build(&self, domain: &Domain, assembly: &StaticAssembly) -> Result<(LoadedAssembly, Option<Vec<u8>>)> {
        for path in &self.options.search_paths {
            domain.add_search_path(path.clone())?;
        }

        let mut woven = assembly.clone();
        if self.options.weave {
            let count = weave(&mut woven, &self.options.include)?;
            debug!("{} method(s) woven with {:?}", count, self.options.include);
        }

        match self.options.strategy {
            Strategy::Dynamic => {
                let live = StagedModuleBuilder::new(domain, &woven, &self.options.include)
                    .max_resolution_depth(self.options.max_resolution_depth)
                    .build()?;
                Ok((live, None))
            }
            Strategy::StaticRewrite => {
                let image = woven.to_bytes()?;
                let rewritten = StaticAssembly::from_bytes(&image)?;
                let everything = TypeFilter::all();
                let live = StagedModuleBuilder::new(domain, &rewritten, &everything)
                    .max_resolution_depth(self.options.max_resolution_depth)
                    .build()?;
                Ok((live, Some(image)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::definitions::TypeAttributes;

    #[test]
    fn filters_select_by_name() {
        let sample = TypeDefinition::new("Tests", "SampleClass", TypeAttributes::PUBLIC);
        let other = TypeDefinition::new("Tests", "Helper", TypeAttributes::PUBLIC);

        let filter = TypeFilter::name_contains("Sample");
        assert!(filter.matches(&sample));
        assert!(!filter.matches(&other));
        assert!(TypeFilter::all().matches(&other));

        let public = TypeFilter::custom("namespace Tests", |ty| ty.namespace == "Tests");
        assert!(public.matches(&other));
        assert_eq!(format!("{public:?}"), "TypeFilter(\"namespace Tests\")");
    }

    #[test]
    fn options_default_to_static_rewrite() {
        let options = InstrumentOptions::new(TypeFilter::all())
            .search_path("/tmp")
            .max_resolution_depth(8);
        assert_eq!(options.strategy, Strategy::StaticRewrite);
        assert!(options.weave);
        assert_eq!(options.search_paths, vec![PathBuf::from("/tmp")]);
        assert_eq!(options.max_resolution_depth, 8);
        assert_eq!(Strategy::Dynamic.to_string(), "Dynamic");
    }

    #[test]
    fn missing_source_is_rejected() {
        let domain = Domain::new().unwrap();
        let instrumenter = Instrumenter::new(TypeFilter::all());
        assert!(matches!(
            instrumenter.instrument_and_load(&domain, None, None),
            Err(Error::MissingArgument("source"))
        ));
    }
}
