//! Site-identity lookup: `shops.csv` (`id,name`) -> `resolve_site_id(hostname)`.
//!
//! A single trailing decimal digit in the hostname disambiguates multi-register
//! sites (e.g. host `shop12-3` at site `shop12` register `3` becomes id
//! `shop12_3`).

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ShopRecord {
    id: String,
    name: String,
}

#[derive(Debug, Clone, Default)]
pub struct SiteMap {
    by_hostname: HashMap<String, String>,
}

impl SiteMap {
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("opening site map at {}", path.display()))?;
        let mut by_hostname = HashMap::new();
        for record in reader.deserialize() {
            let record: ShopRecord =
                record.with_context(|| format!("parsing row in {}", path.display()))?;
            // `name` is the hostname the register reports; `id` is the stable
            // site identifier used in output filenames.
            by_hostname.insert(record.name, record.id);
        }
        Ok(SiteMap { by_hostname })
    }

    /// Resolves a hostname to a site id, appending `_<digit>` when the
    /// hostname carries exactly one trailing decimal digit as a register
    /// disambiguator. Returns `"UNKNOWN"` when the base hostname has no
    /// entry in the map.
    pub fn resolve_site_id(&self, hostname: &str) -> String {
        let digits: Vec<char> = hostname.chars().filter(|c| c.is_ascii_digit()).collect();
        let (base, suffix) = if digits.len() == 1 {
            let d = digits[0];
            let base: String = hostname.chars().filter(|c| *c != d).collect();
            (base, Some(d))
        } else {
            (hostname.to_string(), None)
        };

        let id = self
            .by_hostname
            .get(&base)
            .cloned()
            .or_else(|| self.by_hostname.get(hostname).cloned())
            .unwrap_or_else(|| "UNKNOWN".to_string());

        match suffix {
            Some(d) if id != "UNKNOWN" => format!("{id}_{d}"),
            _ => id,
        }
    }
}
