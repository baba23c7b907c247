//! Property-based tests for the demangler.
//!
//! These verify that arbitrary input is handled safely: the parser either
//! produces text or reports an error, deterministically, without panicking
//! or running away.

use proptest::prelude::*;

use itanium_demangler::{demangle, Symbol};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(4096))]

    /// Demangling arbitrary strings never panics.
    #[test]
    fn demangle_never_panics(s in ".*") {
        let _ = demangle(&s);
    }

    /// Mangled-looking prefixes never panic either.
    #[test]
    fn mangled_prefix_handling(suffix in "[a-zA-Z0-9_.$]*") {
        let _ = demangle(&format!("_Z{suffix}"));
        let _ = demangle(&format!("__Z{suffix}"));
        let _ = demangle(&format!("___Z{suffix}"));
    }

    /// Demangling is deterministic.
    #[test]
    fn demangle_is_deterministic(s in ".*") {
        prop_assert_eq!(demangle(&s), demangle(&s));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1024))]

    /// Well-formed nested names always demangle to their `::`-joined
    /// parts.
    #[test]
    fn nested_names_round_out(
        parts in prop::collection::vec("[a-zA-Z_][a-zA-Z0-9_]{0,8}", 1..5)
    ) {
        let inner: String = parts
            .iter()
            .map(|p| format!("{}{}", p.len(), p))
            .collect();
        let mangled = format!("_ZN{inner}E");
        let expected = parts.join("::");
        prop_assert_eq!(demangle(&mangled).unwrap(), expected);
    }

    /// A function over the recognized builtin parameter codes demangles,
    /// and its parameter list is recoverable through the partial API.
    #[test]
    fn builtin_parameter_lists(
        name in "[a-zA-Z_][a-zA-Z0-9_]{0,8}",
        params in "[wbcahstijlmxyno]{1,8}"
    ) {
        let mangled = format!("_Z{}{}{}", name.len(), name, params);
        let sym = Symbol::new(&mangled).unwrap();
        prop_assert!(sym.is_function());
        prop_assert_eq!(sym.function_base_name().unwrap(), name.clone());

        let text = sym.demangle();
        prop_assert!(text.starts_with(&name));
        // One printed parameter per code.
        let list = sym.function_parameters().unwrap();
        prop_assert_eq!(list.matches(", ").count() + 1, params.len());
    }

    /// Unconsumed input is always an error, never a truncated success.
    #[test]
    fn trailing_garbage_is_rejected(garbage in "[#@! ]{1,4}") {
        let mangled = format!("_Z3foov{garbage}");
        prop_assert!(demangle(&mangled).is_err());
    }

    /// A pack of N arguments expands to exactly N comma-separated
    /// parameters (and none at all for N == 0).
    #[test]
    fn pack_expansion_cardinality(params in "[ij]{0,6}") {
        let mangled = format!("_Z1fIJ{}EEvDpT_", params);
        let text = demangle(&mangled).unwrap();
        if params.is_empty() {
            prop_assert_eq!(text, "void f<>()".to_string());
        } else {
            let inner = &text[text.rfind('(').unwrap() + 1..text.len() - 1];
            prop_assert_eq!(inner.split(", ").count(), params.len());
        }
    }
}
