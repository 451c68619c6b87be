use std::path::Path;
use tracing::warn;

use crate::error::BotError;

/// Network egress routes, one per line. An empty pool is a legitimate state
/// (every account runs proxyless), not an error.
#[derive(Debug, Clone, Default)]
pub struct ProxyPool {
    proxies: Vec<String>,
    pub dropped: usize,
}

impl ProxyPool {
    /// A missing file counts as an empty pool.
    pub fn load(path: &Path) -> Result<Self, BotError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            BotError::Config(format!("cannot read proxy file '{}': {}", path.display(), e))
        })?;
        Ok(Self::parse(&text))
    }

    pub fn parse(text: &str) -> Self {
        let mut proxies = Vec::new();
        let mut dropped = 0;
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.contains("://") {
                proxies.push(line.to_string());
            } else {
                dropped += 1;
                warn!("Proxy line {} dropped: missing scheme in '{}'", lineno + 1, line);
            }
        }
        Self { proxies, dropped }
    }

    /// Deterministic round-robin: a pure function of (account index, pool
    /// size), so the same account always maps to the same pool slot.
    pub fn assign(&self, account_index: usize) -> Option<&str> {
        if self.proxies.is_empty() {
            None
        } else {
            Some(self.proxies[account_index % self.proxies.len()].as_str())
        }
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pool_assigns_proxyless() {
        let pool = ProxyPool::parse("");
        for i in 0..5 {
            assert_eq!(pool.assign(i), None);
        }
    }

    #[test]
    fn assignment_is_index_modulo_pool_size() {
        let pool = ProxyPool::parse("http://a:8080\nhttp://b:8080\n");
        assert_eq!(pool.assign(0), Some("http://a:8080"));
        assert_eq!(pool.assign(1), Some("http://b:8080"));
        assert_eq!(pool.assign(2), Some("http://a:8080"));
        // stable across repeated calls
        assert_eq!(pool.assign(2), Some("http://a:8080"));
    }

    #[test]
    fn schemeless_lines_are_dropped() {
        let pool = ProxyPool::parse("# routes\nhost:8080\nsocks5://c:1080\n");
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.dropped, 1);
    }

    #[test]
    fn missing_file_is_an_empty_pool() {
        let pool = ProxyPool::load(Path::new("definitely/not/here.txt")).unwrap();
        assert!(pool.is_empty());
    }
}
