//! Parse functions - turn raw semicolon-delimited text into typed rows

use crate::error::SourceError;
use crate::ingestion::types::{
    columns, first_value, is_standard_power, Cell, ConditionRow, PriceRow, RawSource, Row, Table,
    TariffStructure,
};
use csv::{ReaderBuilder, Trim};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

static NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?\d+(?:[.,]\d+)?$").expect("numeric pattern compiles"));

/// Coerce a trimmed field: signed integers and comma-or-dot decimals become
/// numbers, everything else (including empty) stays text.
pub fn coerce_value(raw: &str) -> Cell {
    let value = raw.trim();
    if !value.is_empty() && NUMERIC.is_match(value) {
        if let Ok(n) = value.replace(',', ".").parse::<f64>() {
            return Cell::Number(n);
        }
    }
    Cell::Text(value.to_string())
}

fn clean_field(field: &str) -> &str {
    field.trim_matches(|c| c == '\u{feff}' || c == '\r')
}

/// Parse semicolon-delimited text. The first row supplies field names verbatim.
/// Quote characters are ordinary text; lines split on `;` only.
pub fn parse_table(text: &str, origin: &str) -> Result<Table, SourceError> {
    let text = text.trim_start_matches('\u{feff}');
    if text.trim().is_empty() {
        return Err(SourceError::Empty(origin.to_string()));
    }

    let mut reader = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .trim(Trim::Fields)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| SourceError::Header {
            origin: origin.to_string(),
            reason: e.to_string(),
        })?
        .iter()
        .map(|h| clean_field(h).to_string())
        .collect();

    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(SourceError::Header {
            origin: origin.to_string(),
            reason: "header row has no field names".to_string(),
        });
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|f| clean_field(f).trim().is_empty()) {
            continue;
        }
        let row: Row = headers
            .iter()
            .enumerate()
            .map(|(idx, header)| {
                let value = record.get(idx).map(clean_field).unwrap_or("");
                (header.clone(), coerce_value(value))
            })
            .collect();
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(SourceError::NoDataRows(origin.to_string()));
    }

    info!("Parsed {} rows ({} columns) from {}", rows.len(), headers.len(), origin);
    Ok(Table { headers, rows })
}

/// Parse a loaded source into a table
pub fn parse_source(source: RawSource) -> Result<Table, SourceError> {
    let origin = source.origin.clone();
    parse_table(&source.data.into_text(), &origin)
}

fn number_or_zero(row: &Row, column: &str) -> f64 {
    row.get(column).and_then(Cell::as_f64).unwrap_or(0.0)
}

fn optional_rate(row: &Row, column: &str) -> Option<f64> {
    row.get(column).and_then(Cell::as_f64).filter(|r| *r > 0.0)
}

fn key_field(row: &Row, column: &str) -> Option<String> {
    row.get(column)
        .filter(|c| !c.is_blank())
        .map(Cell::to_key)
}

/// Extract pricing rows. Rows without a provider/proposal key are dropped;
/// non-numeric rates become 0 and are filtered later by the builder.
pub fn price_rows(table: &Table) -> Vec<PriceRow> {
    let mut out = Vec::with_capacity(table.rows.len());
    let mut dropped = 0usize;
    let mut unusual_power = 0usize;

    for (idx, row) in table.rows.iter().enumerate() {
        let (provider, proposal) = match (
            key_field(row, columns::PROVIDER),
            key_field(row, columns::PROPOSAL),
        ) {
            (Some(p), Some(c)) => (p, c),
            _ => {
                dropped += 1;
                if dropped <= 10 {
                    warn!("Price row {} has no provider/proposal key", idx);
                }
                continue;
            }
        };

        // Kept as-is; only reported
        let power_kva = number_or_zero(row, columns::POWER);
        if !is_standard_power(power_kva) {
            unusual_power += 1;
            if unusual_power <= 10 {
                warn!(
                    "Price row {} ({}/{}) has non-standard power {} kVA",
                    idx, provider, proposal, power_kva
                );
            }
        }

        let tariff_code = number_or_zero(row, columns::TARIFF).round();
        let tariff = if (0.0..=255.0).contains(&tariff_code) {
            TariffStructure::from(tariff_code as u8)
        } else {
            TariffStructure::Other(0)
        };

        out.push(PriceRow {
            provider,
            proposal,
            power_kva,
            tariff,
            fixed_daily: number_or_zero(row, columns::FIXED_DAILY),
            energy_primary: number_or_zero(row, columns::ENERGY_PRIMARY),
            energy_secondary: optional_rate(row, columns::ENERGY_SECONDARY),
            energy_off_peak: optional_rate(row, columns::ENERGY_OFF_PEAK),
        });
    }

    if dropped > 0 {
        info!("Dropped {} price rows without key fields", dropped);
    }
    if unusual_power > 0 {
        info!("{} price rows carry a non-standard contracted power", unusual_power);
    }
    out
}

/// Extract commercial-condition rows, keeping all columns in `raw`
pub fn condition_rows(table: &Table) -> Vec<ConditionRow> {
    let mut out = Vec::with_capacity(table.rows.len());
    let mut dropped = 0usize;

    for (idx, row) in table.rows.iter().enumerate() {
        let (provider, proposal) = match (
            key_field(row, columns::PROVIDER),
            key_field(row, columns::PROPOSAL),
        ) {
            (Some(p), Some(c)) => (p, c),
            _ => {
                dropped += 1;
                if dropped <= 10 {
                    warn!("Condition row {} has no provider/proposal key", idx);
                }
                continue;
            }
        };

        let lock_in_texts = columns::LOCK_IN_TEXT
            .iter()
            .filter_map(|c| row.get(*c).and_then(Cell::as_text))
            .map(str::to_string)
            .collect();

        out.push(ConditionRow {
            provider,
            proposal,
            supply: first_value(row, &[columns::SUPPLY]).unwrap_or_default(),
            segment: first_value(row, &[columns::SEGMENT]),
            name: first_value(row, &[columns::NAME]),
            phone: first_value(row, columns::PHONE),
            website: first_value(row, columns::WEBSITE),
            valid_from: first_value(row, &[columns::VALID_FROM]),
            valid_to: first_value(row, &[columns::VALID_TO]),
            lock_in_flag: first_value(row, columns::LOCK_IN_FLAG),
            lock_in_duration: columns::LOCK_IN_DURATION
                .iter()
                .filter_map(|c| row.get(*c))
                .find_map(|cell| match cell {
                    Cell::Number(n) if n.is_finite() => Some(*n),
                    _ => None,
                }),
            lock_in_texts,
            raw: row.clone(),
        });
    }

    if dropped > 0 {
        info!("Dropped {} condition rows without key fields", dropped);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRICES: &str = "\u{feff}COM;COD_Proposta;Pot_Cont;Contagem;TF;TV|TVFV|TVP;TVV|TVC;TVVz\r\n\
        EDP;P1;6,9;1;0,2500;0,1600;;\r\n\
        GAL;G2;6.9;2;0,3;0,19;0,11;\r\n";

    #[test]
    fn test_coerce_value() {
        assert_eq!(coerce_value(" 42 "), Cell::Number(42.0));
        assert_eq!(coerce_value("-0,5"), Cell::Number(-0.5));
        assert_eq!(coerce_value("3.14"), Cell::Number(3.14));
        assert_eq!(coerce_value(""), Cell::Text(String::new()));
        assert_eq!(coerce_value("ELE"), Cell::Text("ELE".into()));
        assert_eq!(coerce_value("1.234,56"), Cell::Text("1.234,56".into()));
        assert_eq!(coerce_value("12 meses"), Cell::Text("12 meses".into()));
    }

    #[test]
    fn test_numeric_round_trip_with_comma() {
        for original in ["3,14", "-0,5", "0,1543", "42", "-7", "10,35"] {
            let value = match coerce_value(original) {
                Cell::Number(n) => n,
                other => panic!("expected number for {}, got {:?}", original, other),
            };
            assert_eq!(format!("{}", value).replace('.', ","), original);
        }
    }

    #[test]
    fn test_parse_table_strips_bom_and_cr() {
        let table = parse_table(PRICES, "prices").unwrap();

        assert_eq!(table.headers[0], "COM");
        assert_eq!(table.headers[5], "TV|TVFV|TVP");
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0]["COM"], Cell::Text("EDP".into()));
        assert_eq!(table.rows[0]["TF"], Cell::Number(0.25));
        assert_eq!(table.rows[0]["TVVz"], Cell::Text(String::new()));
    }

    #[test]
    fn test_parse_table_requires_data_rows() {
        assert!(matches!(
            parse_table("COM;TF\n", "prices"),
            Err(SourceError::NoDataRows(_))
        ));
        assert!(matches!(parse_table("  \n", "prices"), Err(SourceError::Empty(_))));
    }

    #[test]
    fn test_parse_table_keeps_quotes_as_text() {
        let text = "COM;COD_Proposta;Fornecimento;Descrição\n\
            EDP;P1;ELE;\"Oferta\" especial\n\
            GAL;G1;ELE;\"Campanha sem fecho\n\
            IBD;I1;ELE;Tarifa base\n\
            END;E1;ELE;Outra\n";
        let table = parse_table(text, "conditions").unwrap();

        assert_eq!(table.rows.len(), 4);
        assert_eq!(
            table.rows[0]["Descrição"],
            Cell::Text("\"Oferta\" especial".into())
        );
        assert_eq!(
            table.rows[1]["Descrição"],
            Cell::Text("\"Campanha sem fecho".into())
        );
        assert_eq!(table.rows[2]["COM"], Cell::Text("IBD".into()));
        assert_eq!(table.rows[3]["COM"], Cell::Text("END".into()));
    }

    #[test]
    fn test_parse_table_headers_verbatim() {
        let table = parse_table("\u{feff}COM ; Data ini;TF\r\nEDP; x ;0,2\r\n", "t").unwrap();

        assert_eq!(table.headers, vec!["COM ", " Data ini", "TF"]);
        assert_eq!(table.rows[0][" Data ini"], Cell::Text("x".into()));
        assert_eq!(table.rows[0]["TF"], Cell::Number(0.2));
    }

    #[test]
    fn test_parse_table_short_rows() {
        let table = parse_table("A;B;C\n1;x\n", "t").unwrap();
        assert_eq!(table.rows[0]["C"], Cell::Text(String::new()));
    }

    #[test]
    fn test_price_rows() {
        let table = parse_table(PRICES, "prices").unwrap();
        let rows = price_rows(&table);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].provider, "EDP");
        assert_eq!(rows[0].tariff, TariffStructure::Simple);
        assert_eq!(rows[0].power_kva, 6.9);
        assert_eq!(rows[0].energy_secondary, None);
        assert_eq!(rows[1].tariff, TariffStructure::BiHourly);
        assert_eq!(rows[1].energy_secondary, Some(0.11));
    }

    #[test]
    fn test_price_rows_non_numeric_become_zero() {
        let table = parse_table(
            "COM;COD_Proposta;Pot_Cont;Contagem;TF;TV|TVFV|TVP\nX;1;6,9;1;n/d;0,15\n;2;6,9;1;0,2;0,1\n",
            "prices",
        )
        .unwrap();
        let rows = price_rows(&table);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].proposal, "1");
        assert_eq!(rows[0].fixed_daily, 0.0);
    }

    #[test]
    fn test_condition_rows() {
        let text = "COM;COD_Proposta;Fornecimento;NomeProposta;LinkOfertaCom;LinkCOM;Fidelização;PrazoFidelização;DescFidelização\n\
            EDP;P1;ELE;Tarifa Casa;;https://edp.pt;S;12;Penalização por rescisão\n";
        let table = parse_table(text, "conditions").unwrap();
        let rows = condition_rows(&table);

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert!(row.is_electricity());
        assert_eq!(row.name.as_deref(), Some("Tarifa Casa"));
        assert_eq!(row.website.as_deref(), Some("https://edp.pt"));
        assert_eq!(row.lock_in_flag.as_deref(), Some("S"));
        assert_eq!(row.lock_in_duration, Some(12.0));
        assert_eq!(row.lock_in_texts, vec!["Penalização por rescisão".to_string()]);
    }
}
