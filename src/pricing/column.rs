use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

/// Output column for a region's price, e.g. `Region de Ñuble` → `Precio_Nuble`.
pub fn region_column(region_name: &str) -> String {
    let folded = region_name
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>();
    let stripped = folded.replace("Region de ", "").replace("Region del ", "");
    let cleaned = stripped
        .chars()
        .filter(|c| *c != '.')
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect::<String>();
    format!("Precio_{cleaned}")
}
