//! Element symbol utilities
//!
//! Atom types are atomic numbers by convention; these helpers translate
//! element symbols in either case ("CL", "cl", "Cl") to numbers.

use std::collections::HashMap;

/// Element symbols ordered by atomic number, starting at hydrogen
pub const ELEMENTS: [&str; 118] = [
    "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S", "Cl",
    "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge", "As",
    "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd", "In",
    "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm", "Sm", "Eu", "Gd", "Tb",
    "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg", "Tl",
    "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", "Pa", "U", "Np", "Pu", "Am", "Cm", "Bk",
    "Cf", "Es", "Fm", "Md", "No", "Lr", "Rf", "Db", "Sg", "Bh", "Hs", "Mt", "Ds", "Rg", "Cn", "Nh",
    "Fl", "Mc", "Lv", "Ts", "Og",
];

lazy_static::lazy_static! {
    static ref SYMBOL_TO_NUMBER: HashMap<&'static str, i32> = ELEMENTS
        .iter()
        .enumerate()
        .map(|(idx, &symbol)| (symbol, idx as i32 + 1))
        .collect();
}

/// Normalize capitalisation: first letter upper, rest lower
fn normalize_symbol(symbol: &str) -> String {
    let mut chars = symbol.trim().chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
        None => String::new(),
    }
}

/// Atomic number for an element symbol, `None` if unknown
pub fn atomic_number(symbol: &str) -> Option<i32> {
    SYMBOL_TO_NUMBER
        .get(normalize_symbol(symbol).as_str())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_number() {
        assert_eq!(atomic_number("H"), Some(1));
        assert_eq!(atomic_number("C"), Some(6));
        assert_eq!(atomic_number("CL"), Some(17));
        assert_eq!(atomic_number(" fe "), Some(26));
        assert_eq!(atomic_number("Og"), Some(118));
        assert_eq!(atomic_number("Xx"), None);
        assert_eq!(atomic_number(""), None);
    }
}
