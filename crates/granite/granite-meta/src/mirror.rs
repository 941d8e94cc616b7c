use crate::store::KvStore;
use granite_store::FileRouter;
use strata_events::QUABO_BITS;
use tracing::{debug, warn};

/// Hash whose fields name the keys changed since the last poll.
pub const UPDATED_KEY: &str = "UPDATED";

/// `{ RedisKey :<name>, <field> :<value>, ...}`
pub fn metadata_text(name: &str, fields: &[(String, String)]) -> String {
    let mut out = format!("{{ RedisKey :{name}");
    for (k, v) in fields {
        out.push_str(", ");
        out.push_str(k);
        out.push_str(" :");
        out.push_str(v);
    }
    out.push('}');
    out
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorStats {
    pub polls: u64,
    /// TEXT records appended.
    pub written: u64,
    /// Dirty keys whose module has no open file set.
    pub skipped: u64,
    /// Store or write failures.
    pub failed: u64,
}

#[derive(Debug, PartialEq, Eq)]
enum Target {
    Module(u16),
    Global,
}

/// Names starting with a digit encode a module/quabo id; the rest are
/// session-wide.
fn target(name: &str) -> Option<Target> {
    let digits = name.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return Some(Target::Global);
    }
    let id: u32 = name[..digits].parse().ok()?;
    u16::try_from(id >> QUABO_BITS).ok().map(Target::Module)
}

fn is_dirty(flag: &str) -> bool {
    let flag = flag.trim();
    match flag.parse::<i64>() {
        Ok(v) => v != 0,
        Err(_) => !flag.is_empty(),
    }
}

/// Copies changed keys from a [`KvStore`] into the router's metadata files.
pub struct MetadataMirror<S> {
    store: S,
    stats: MirrorStats,
}

impl<S: KvStore> MetadataMirror<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            stats: MirrorStats::default(),
        }
    }

    pub fn stats(&self) -> MirrorStats {
        self.stats
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// One pass over the updated-keys hash. Returns the number of records
    /// appended; nothing here is fatal.
    pub fn poll(&mut self, router: &mut FileRouter) -> usize {
        self.stats.polls += 1;
        let updated = match self.store.hgetall(UPDATED_KEY) {
            Ok(updated) => updated,
            Err(e) => {
                warn!(key = UPDATED_KEY, error = %e, "skipping metadata poll");
                self.stats.failed += 1;
                return 0;
            }
        };

        let mut written = 0;
        for (name, flag) in &updated {
            if !is_dirty(flag) {
                continue;
            }
            let Some(target) = target(name) else {
                debug!(key = %name, "metadata id out of range");
                self.stats.skipped += 1;
                continue;
            };
            if let Target::Module(module) = target {
                if !router.has_module(module) {
                    debug!(key = %name, module, "no file set for metadata key");
                    self.stats.skipped += 1;
                    continue;
                }
            }

            let fields = match self.store.hgetall(name) {
                Ok(fields) => fields,
                Err(e) => {
                    warn!(key = %name, error = %e, "skipping metadata key");
                    self.stats.failed += 1;
                    continue;
                }
            };
            let text = metadata_text(name, &fields);
            let result = match target {
                Target::Module(module) => router.write_module_meta(module, text.as_bytes()),
                Target::Global => router.write_global_meta(text.as_bytes()),
            };
            match result {
                Ok(()) => {
                    written += 1;
                    self.stats.written += 1;
                }
                Err(e) => {
                    warn!(key = %name, error = %e, "metadata record dropped");
                    self.stats.failed += 1;
                }
            }
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_map_to_module_or_global() {
        assert_eq!(target("14"), Some(Target::Module(14 >> QUABO_BITS)));
        assert_eq!(target("14"), Some(Target::Module(3)));
        assert_eq!(target("0"), Some(Target::Module(0)));
        assert_eq!(target("253x"), Some(Target::Module(63)));
        assert_eq!(target("GPSPRIM"), Some(Target::Global));
        assert_eq!(target("99999999999"), None);
    }

    #[test]
    fn dirty_flags() {
        assert!(is_dirty("1"));
        assert!(is_dirty(" 2 "));
        assert!(!is_dirty("0"));
        assert!(!is_dirty(""));
        assert!(is_dirty("yes"));
    }

    #[test]
    fn text_layout() {
        let fields = vec![("LAT".to_string(), "37.3".to_string())];
        assert_eq!(metadata_text("GPSPRIM", &fields), "{ RedisKey :GPSPRIM, LAT :37.3}");
        assert_eq!(metadata_text("WRSWITCH", &[]), "{ RedisKey :WRSWITCH}");
    }
}
