//! Backend variants and binary naming

use std::fmt;
use std::str::FromStr;

/// One of the two runtime backends every mod is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Variant {
    /// Windows / XNA backend
    Xna,
    /// Cross-platform FNA backend
    Fna,
}

impl Variant {
    /// Both variants, in build order
    pub const ALL: [Variant; 2] = [Variant::Xna, Variant::Fna];

    /// Tag used in file names and as the preprocessor symbol
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Xna => "XNA",
            Self::Fna => "FNA",
        }
    }

    /// Main binary entry name for a mod, e.g. `ExampleMod.XNA.dll`
    pub fn binary_name(&self, mod_name: &str) -> String {
        format!("{}.{}.dll", mod_name, self.tag())
    }

    /// Variant-specific library file name, e.g. `Newtonsoft.Json.FNA.dll`
    pub fn library_name(&self, library: &str) -> String {
        format!("{}.{}.dll", library, self.tag())
    }

    /// Whether this variant gets an extra debug-symbol artifact in the
    /// secondary format.
    pub fn wants_secondary_symbols(&self) -> bool {
        matches!(self, Self::Fna)
    }

    /// Position of the variant in a two-step build
    pub fn index(&self) -> usize {
        match self {
            Self::Xna => 0,
            Self::Fna => 1,
        }
    }
}

/// Variant-neutral precompiled binary name, e.g. `ExampleMod.All.dll`
pub fn all_platforms_binary_name(mod_name: &str) -> String {
    format!("{}.All.dll", mod_name)
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xna" => Ok(Self::Xna),
            "fna" => Ok(Self::Fna),
            other => Err(format!("unknown variant '{}', expected 'xna' or 'fna'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_names() {
        assert_eq!(Variant::Xna.binary_name("ExampleMod"), "ExampleMod.XNA.dll");
        assert_eq!(Variant::Fna.binary_name("ExampleMod"), "ExampleMod.FNA.dll");
        assert_eq!(all_platforms_binary_name("ExampleMod"), "ExampleMod.All.dll");
    }

    #[test]
    fn test_parse_variant() {
        assert_eq!("XNA".parse::<Variant>().unwrap(), Variant::Xna);
        assert_eq!("fna".parse::<Variant>().unwrap(), Variant::Fna);
        assert!("mono".parse::<Variant>().is_err());
    }

    #[test]
    fn test_secondary_symbols_only_for_fna() {
        assert!(!Variant::Xna.wants_secondary_symbols());
        assert!(Variant::Fna.wants_secondary_symbols());
    }
}
