//! Core → system lookup for multi-system emulators.

/// System tag used when a core cannot be identified.
pub const UNKNOWN_SYSTEM: &str = "Unknown";

/// libretro core fragments → system. Checked in order as case-insensitive
/// substrings, so more specific fragments come first (`mesen-s` before `mesen`).
const CORE_SYSTEMS: &[(&str, &str)] = &[
    ("mesen-s", "SNES"),
    ("snes9x", "SNES"),
    ("bsnes", "SNES"),
    ("mesen", "NES"),
    ("nestopia", "NES"),
    ("fceumm", "NES"),
    ("quicknes", "NES"),
    ("mgba", "Game Boy Advance"),
    ("vba", "Game Boy Advance"),
    ("gpsp", "Game Boy Advance"),
    ("gambatte", "Game Boy"),
    ("sameboy", "Game Boy"),
    ("gearboy", "Game Boy"),
    ("genesis_plus_gx", "Genesis"),
    ("picodrive", "Genesis"),
    ("blastem", "Genesis"),
    ("mupen64", "Nintendo 64"),
    ("parallel_n64", "Nintendo 64"),
    ("melonds", "Nintendo DS"),
    ("desmume", "Nintendo DS"),
    ("swanstation", "PlayStation"),
    ("duckstation", "PlayStation"),
    ("mednafen_psx", "PlayStation"),
    ("beetle_psx", "PlayStation"),
    ("pcsx", "PlayStation"),
    ("fbneo", "Arcade"),
    ("fbalpha", "Arcade"),
    ("mame", "Arcade"),
    ("stella", "Atari 2600"),
];

/// Substring match of a core identifier against the known cores.
pub fn system_for_core(core: &str) -> Option<&'static str> {
    let core = core.trim().to_ascii_lowercase();
    if core.is_empty() {
        return None;
    }
    CORE_SYSTEMS
        .iter()
        .find(|(fragment, _)| core.contains(fragment))
        .map(|(_, system)| *system)
}

/// Every system the core table can produce, without duplicates.
pub fn known_systems() -> Vec<String> {
    let mut systems: Vec<String> = Vec::new();
    for (_, system) in CORE_SYSTEMS {
        if !systems.iter().any(|s| s == system) {
            systems.push(system.to_string());
        }
    }
    systems
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_matching() {
        assert_eq!(system_for_core("snes9x_libretro"), Some("SNES"));
        assert_eq!(system_for_core("Mesen-S"), Some("SNES"));
        assert_eq!(system_for_core("mesen_libretro"), Some("NES"));
        assert_eq!(system_for_core("MGBA"), Some("Game Boy Advance"));
        assert_eq!(system_for_core("mame2003_plus"), Some("Arcade"));
        assert_eq!(system_for_core("pcsx_rearmed"), Some("PlayStation"));
        assert_eq!(system_for_core("dosbox"), None);
        assert_eq!(system_for_core("  "), None);
    }

    #[test]
    fn test_known_systems_unique() {
        let systems = known_systems();
        let mut deduped = systems.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(systems.len(), deduped.len());
        assert!(systems.contains(&"Arcade".to_string()));
    }
}
