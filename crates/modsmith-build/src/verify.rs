//! Identity checks on compiled mod binaries
use crate::error::{BuildError, BuildResult, VerifyRule};
use crate::inspect::ModuleInfo;

/// Base type every mod's entry class extends
pub const MOD_BASE_TYPE: &str = "Terraria.ModLoader.Mod";

/// Name reserved for the host itself
pub const RESERVED_NAME: &str = "Terraria";

/// Check a compiled module against the mod it was built for.
///
/// Rules apply in order: the module name equals the mod name, the mod name
/// is not reserved, exactly one top-level type extends [`MOD_BASE_TYPE`],
/// and that type's top-level namespace is the mod name.
pub fn verify_module(mod_name: &str, module: &ModuleInfo) -> BuildResult<()> {
    let fail = |rule| Err(BuildError::verification(mod_name, rule));

    if module.name != mod_name {
        return fail(VerifyRule::NameMismatch {
            expected: mod_name.to_string(),
            found: module.name.clone(),
        });
    }

    if mod_name.eq_ignore_ascii_case(RESERVED_NAME) {
        return fail(VerifyRule::ReservedName);
    }

    let mod_classes: Vec<_> = module
        .types
        .iter()
        .filter(|t| t.base_type.as_deref() == Some(MOD_BASE_TYPE))
        .collect();
    let [mod_class] = mod_classes.as_slice() else {
        return fail(VerifyRule::MissingOrAmbiguousModClass {
            found: mod_classes.len(),
        });
    };

    let top_namespace = mod_class.namespace.split('.').next().unwrap_or_default();
    if top_namespace != mod_name {
        return fail(VerifyRule::NamespaceMismatch {
            expected: mod_name.to_string(),
            found: mod_class.namespace.clone(),
        });
    }

    Ok(())
}
