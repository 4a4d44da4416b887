//! Engine resolution and engine compatibility filtering

use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::engine::DashboardEngine;
use crate::error::{PluginLoaderError, Result};
use crate::loader::BundleLoader;
use crate::plugin::{DashboardPluginDescriptor, ReadyPlugin};
use crate::version::{Version, VersionRange};

/// An engine loaded from one of the referenced plugin bundles
#[derive(Clone)]
pub struct EngineCandidate {
    pub url: String,
    pub engine: Arc<dyn DashboardEngine>,
}

impl std::fmt::Debug for EngineCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineCandidate")
            .field("url", &self.url)
            .field("version", &self.engine.version())
            .finish()
    }
}

/// Picks the one engine a session runs on from the loaded candidates
pub trait EngineCompatibilityResolver: Send + Sync {
    /// Choose an engine.
    ///
    /// # Arguments
    ///
    /// * `candidates` - One engine per distinct instance, in reference order
    ///
    /// # Returns
    ///
    /// The engine every plugin of the session is installed into, or
    /// [`PluginLoaderError::EngineResolution`] if none is acceptable.
    fn resolve(&self, candidates: &[EngineCandidate]) -> Result<Arc<dyn DashboardEngine>>;
}

/// Chooses the candidate with the highest declared version.
///
/// Versions compare as semantic versions, so a release beats its own
/// pre-releases. Candidates with unparseable versions are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct HighestVersionEngineResolver;

impl EngineCompatibilityResolver for HighestVersionEngineResolver {
    fn resolve(&self, candidates: &[EngineCandidate]) -> Result<Arc<dyn DashboardEngine>> {
        let mut best: Option<(&EngineCandidate, Version)> = None;
        for candidate in candidates {
            let Ok(version) = Version::parse(candidate.engine.version()) else {
                warn!(
                    "⚠️ Ignoring engine from {} with unparseable version '{}'",
                    candidate.url,
                    candidate.engine.version()
                );
                continue;
            };
            if best.as_ref().map_or(true, |(_, current)| version > *current) {
                best = Some((candidate, version));
            }
        }

        let (winner, version) = best.ok_or_else(|| {
            PluginLoaderError::EngineResolution("no engine with a valid version was loaded".to_string())
        })?;

        if candidates
            .iter()
            .any(|candidate| Version::parse(candidate.engine.version()).ok().as_ref() != Some(&version))
        {
            let versions: Vec<&str> = candidates.iter().map(|c| c.engine.version()).collect();
            warn!(
                "⚠️ Referenced plugins bundle different engines ({}); using v{} from {}",
                versions.join(", "),
                version,
                winner.url
            );
        }

        Ok(Arc::clone(&winner.engine))
    }
}

/// Loads the engines of referenced plugin bundles and settles on one
pub struct EngineResolver {
    loader: Arc<BundleLoader>,
    resolver: Arc<dyn EngineCompatibilityResolver>,
}

impl EngineResolver {
    pub fn new(loader: Arc<BundleLoader>, resolver: Arc<dyn EngineCompatibilityResolver>) -> Self {
        Self { loader, resolver }
    }

    /// Load the engine of every referenced plugin bundle concurrently and
    /// let the compatibility resolver pick one.
    ///
    /// Callers must handle the zero-plugin case themselves.
    ///
    /// # Arguments
    ///
    /// * `referenced_plugins` - Plugins the dashboard links; URLs listed more
    ///   than once are loaded once, and URLs that resolve to the same cached
    ///   engine count as a single candidate
    ///
    /// # Returns
    ///
    /// The chosen engine. Fails with [`PluginLoaderError::NoPluginsReferenced`]
    /// on an empty slice, or with the first engine load error.
    pub async fn resolve_engine(
        &self,
        referenced_plugins: &[Arc<DashboardPluginDescriptor>],
    ) -> Result<Arc<dyn DashboardEngine>> {
        if referenced_plugins.is_empty() {
            return Err(PluginLoaderError::NoPluginsReferenced);
        }

        let mut urls: Vec<&str> = Vec::with_capacity(referenced_plugins.len());
        for plugin in referenced_plugins {
            if !urls.contains(&plugin.url.as_str()) {
                urls.push(&plugin.url);
            }
        }

        let engines = try_join_all(urls.iter().map(|url| self.loader.load_engine(url))).await?;

        // Several URLs may resolve to one cached engine
        let mut candidates: Vec<EngineCandidate> = Vec::with_capacity(engines.len());
        for (url, engine) in urls.iter().zip(engines) {
            if candidates.iter().any(|candidate| Arc::ptr_eq(&candidate.engine, &engine)) {
                continue;
            }
            candidates.push(EngineCandidate {
                url: url.to_string(),
                engine,
            });
        }

        debug!("🔍 Resolving engine from {} candidate(s)", candidates.len());
        let engine = self.resolver.resolve(&candidates)?;
        info!("🔧 Using engine v{}", engine.version());
        Ok(engine)
    }
}

/// Drop the plugins whose engine range does not admit `engine`.
///
/// An explicit `compatibility` expression takes precedence over the min/max
/// bounds. A plugin whose range cannot be parsed is dropped too.
///
/// # Arguments
///
/// * `engine` - The resolved session engine
/// * `plugins` - Ready plugins in link order
///
/// # Returns
///
/// The compatible plugins, still in link order, and the names of the dropped
/// ones. Everything is kept when the engine's own version cannot be parsed.
pub fn filter_compatible_plugins(
    engine: &dyn DashboardEngine,
    plugins: Vec<ReadyPlugin>,
) -> (Vec<ReadyPlugin>, Vec<String>) {
    let Ok(engine_version) = Version::parse(engine.version()) else {
        warn!(
            "⚠️ Engine version '{}' cannot be parsed; skipping plugin compatibility checks",
            engine.version()
        );
        return (plugins, Vec::new());
    };

    let mut compatible = Vec::with_capacity(plugins.len());
    let mut dropped = Vec::new();
    for ready in plugins {
        let plugin = &ready.plugin;
        let range = match plugin.compatibility() {
            Some(expression) => VersionRange::parse(expression),
            None => plugin.engine_range().to_version_range(),
        };

        match range {
            Some(range) if range.matches(&engine_version) => compatible.push(ready),
            Some(_) => {
                warn!(
                    "⚠️ Plugin {} v{} is not compatible with engine v{} and will not be loaded",
                    plugin.display_name(),
                    plugin.version(),
                    engine_version
                );
                dropped.push(plugin.display_name().to_string());
            }
            None => {
                warn!(
                    "⚠️ Plugin {} declares an unusable engine range ({} - {}, compatibility {:?}) and will not be loaded",
                    plugin.display_name(),
                    plugin.min_engine_version(),
                    plugin.max_engine_version(),
                    plugin.compatibility()
                );
                dropped.push(plugin.display_name().to_string());
            }
        }
    }

    (compatible, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{DashboardPlugin, EngineVersionBound, LoadedPlugin};
    use async_trait::async_trait;
    use dashboard_event_system::EventHandlerRegistry;

    struct FixedEngine(&'static str);

    #[async_trait]
    impl DashboardEngine for FixedEngine {
        fn version(&self) -> &str {
            self.0
        }
    }

    struct RangedPlugin {
        name: &'static str,
        min: &'static str,
        max: &'static str,
        compatibility: Option<&'static str>,
    }

    #[async_trait]
    impl DashboardPlugin for RangedPlugin {
        fn display_name(&self) -> &str {
            self.name
        }

        fn version(&self) -> &str {
            "1.0.0"
        }

        fn min_engine_version(&self) -> EngineVersionBound {
            self.min.into()
        }

        fn max_engine_version(&self) -> EngineVersionBound {
            self.max.into()
        }

        fn compatibility(&self) -> Option<&str> {
            self.compatibility
        }

        fn register(&self, _handlers: &EventHandlerRegistry) {}
    }

    fn candidate(url: &str, version: &'static str) -> EngineCandidate {
        EngineCandidate {
            url: url.to_string(),
            engine: Arc::new(FixedEngine(version)),
        }
    }

    fn ready(name: &'static str, min: &'static str, max: &'static str, compatibility: Option<&'static str>) -> ReadyPlugin {
        ReadyPlugin {
            plugin: LoadedPlugin::new(Arc::new(RangedPlugin {
                name,
                min,
                max,
                compatibility,
            })),
            parameters: None,
        }
    }

    #[test]
    fn test_highest_version_wins() {
        let candidates = vec![
            candidate("https://cdn.example.com/a.js", "8.1.0"),
            candidate("https://cdn.example.com/b.js", "8.10.2"),
            candidate("https://cdn.example.com/c.js", "nightly"),
        ];

        let engine = HighestVersionEngineResolver.resolve(&candidates).unwrap();
        assert_eq!(engine.version(), "8.10.2");
    }

    #[test]
    fn test_release_beats_its_pre_release() {
        let candidates = vec![
            candidate("https://cdn.example.com/a.js", "9.0.0-alpha.1"),
            candidate("https://cdn.example.com/b.js", "9.0.0"),
            candidate("https://cdn.example.com/c.js", "9.0.0-rc.2"),
        ];

        let engine = HighestVersionEngineResolver.resolve(&candidates).unwrap();
        assert_eq!(engine.version(), "9.0.0");

        let plugins = vec![
            ready("stable-only", "8.0.0", "8.9.0", Some(">=8.0.0 <9.0.0")),
            ready("rc-tester", "9.0.0-rc.1", "9.0.0", None),
        ];
        let (compatible, dropped) = filter_compatible_plugins(&FixedEngine("9.0.0-rc.2"), plugins);
        assert_eq!(compatible[0].plugin.display_name(), "rc-tester");
        assert_eq!(dropped, vec!["stable-only"]);
    }

    #[test]
    fn test_no_usable_candidate_fails() {
        let result = HighestVersionEngineResolver.resolve(&[candidate("https://cdn.example.com/a.js", "nightly")]);
        assert!(matches!(result, Err(PluginLoaderError::EngineResolution(_))));

        assert!(HighestVersionEngineResolver.resolve(&[]).is_err());
    }

    #[test]
    fn test_filter_compatible_plugins() {
        let plugins = vec![
            ready("in-range", "8.0.0", "8.9.0", None),
            ready("too-new", "9.0.0", "9.9.0", None),
            ready("explicit", "bundled", "bundled", Some(">=8.0.0 <9.0.0")),
            ready("unresolved", "bundled", "8.9.0", None),
        ];

        let (compatible, dropped) = filter_compatible_plugins(&FixedEngine("8.2.0"), plugins);

        let names: Vec<&str> = compatible.iter().map(|ready| ready.plugin.display_name()).collect();
        assert_eq!(names, vec!["in-range", "explicit"]);
        assert_eq!(dropped, vec!["too-new", "unresolved"]);
    }

    #[test]
    fn test_unparseable_engine_version_keeps_everything() {
        let plugins = vec![ready("any", "9.0.0", "9.9.0", None)];
        let (compatible, dropped) = filter_compatible_plugins(&FixedEngine("dev"), plugins);
        assert_eq!(compatible.len(), 1);
        assert!(dropped.is_empty());
    }
}
