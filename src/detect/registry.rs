use super::types::PoseDetector;
use crate::error::DetectorError;

type Constructor = Box<dyn Fn() -> anyhow::Result<Box<dyn PoseDetector>> + Send + Sync>;

/// Name-keyed factory for detector backends.
///
/// Registration order is preserved so front ends can list models in the
/// order they were added.
#[derive(Default)]
pub struct DetectorRegistry {
    entries: Vec<(String, Constructor)>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under `name`, replacing any earlier entry.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn() -> anyhow::Result<Box<dyn PoseDetector>> + Send + Sync + 'static,
    {
        let name = name.into();
        let constructor: Constructor = Box::new(constructor);
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = constructor,
            None => self.entries.push((name, constructor)),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(existing, _)| existing == name)
    }

    /// Instantiate the backend registered as `name`.
    pub fn create(&self, name: &str) -> Result<Box<dyn PoseDetector>, DetectorError> {
        let (_, constructor) = self
            .entries
            .iter()
            .find(|(existing, _)| existing == name)
            .ok_or_else(|| DetectorError::UnknownModel(name.to_string()))?;

        tracing::info!("Instantiating detector '{}'", name);
        constructor().map_err(|source| DetectorError::Backend {
            name: name.to_string(),
            source: source.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Passthrough;

    #[test]
    fn creates_registered_backend() {
        let mut registry = DetectorRegistry::new();
        registry.register("a", || Ok(Box::new(Passthrough::new()) as Box<dyn PoseDetector>));
        let detector = registry.create("a").unwrap();
        assert_eq!(detector.model_name(), Passthrough::NAME);
    }

    #[test]
    fn unknown_name_is_an_error() {
        let registry = DetectorRegistry::new();
        assert!(matches!(
            registry.create("missing"),
            Err(DetectorError::UnknownModel(name)) if name == "missing"
        ));
    }

    #[test]
    fn constructor_failure_is_reported_with_name() {
        let mut registry = DetectorRegistry::new();
        registry.register("broken", || anyhow::bail!("model file missing"));
        let err = registry.create("broken").err().unwrap();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn keeps_registration_order() {
        let mut registry = DetectorRegistry::new();
        for name in ["z", "a", "m"] {
            registry.register(name, || Ok(Box::new(Passthrough::new()) as Box<dyn PoseDetector>));
        }
        registry.register("a", || Ok(Box::new(Passthrough::new()) as Box<dyn PoseDetector>));
        assert_eq!(registry.names(), vec!["z", "a", "m"]);
        assert!(registry.contains("m"));
    }
}
