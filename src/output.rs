//! Output Writer: one CSV row per business hour, appended to a per-day,
//! per-site file with a column schema derived from the PLU catalog.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::aggregator::HourlyRow;
use crate::plu::PluCatalog;

pub struct OutputWriter {
    output_dir: PathBuf,
    site_id: String,
    register: Option<String>,
}

impl OutputWriter {
    pub fn new(output_dir: PathBuf, site_id: String, register: Option<String>) -> Self {
        OutputWriter {
            output_dir,
            site_id,
            register,
        }
    }

    pub(crate) fn path_for(&self, date: NaiveDate) -> PathBuf {
        let mut name = format!("{}_{}", date.format("%Y%m%d"), self.site_id);
        if let Some(register) = &self.register {
            name.push('_');
            name.push_str(register);
        }
        name.push_str(".csv");
        self.output_dir.join(name)
    }

    fn header(catalog: &PluCatalog) -> Vec<String> {
        let mut cols = vec![
            "HourWindow".to_string(),
            "TotalTakings".to_string(),
            "Cash".to_string(),
            "CreditCards".to_string(),
        ];
        cols.extend(catalog.names().iter().cloned());
        cols.push("CustomerCount".to_string());
        cols.push("FirstTransaction".to_string());
        cols.push("LastTransaction".to_string());
        cols.push("NoSale".to_string());
        cols
    }

    fn row_fields(row: &HourlyRow) -> Vec<String> {
        let mut fields = vec![
            row.hour.map(|h| h.encode()).unwrap_or_default(),
            row.total_takings.to_string(),
            row.cash.to_string(),
            row.credit_cards.to_string(),
        ];
        fields.extend(row.plu.iter().map(|m| m.to_string()));
        fields.push(row.customer_count.to_string());
        fields.push(row.first_transaction.clone().unwrap_or_default());
        fields.push(row.last_transaction.clone().unwrap_or_default());
        fields.push(row.no_sale.to_string());
        fields
    }

    /// Appends `row` for `date`, writing the header first if the file is new.
    /// Rows with zero takings or zero customers are discarded per the
    /// invariant that an hour with nothing recorded produces no row.
    pub fn write_row(&self, date: NaiveDate, catalog: &PluCatalog, row: &HourlyRow) -> Result<()> {
        if row.is_empty() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("creating output dir {}", self.output_dir.display()))?;

        let path = self.path_for(date);
        let file_exists = path.exists();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening output file {}", path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if !file_exists {
            writer.write_record(Self::header(catalog))?;
        }
        writer.write_record(Self::row_fields(row))?;
        writer.flush()?;
        Ok(())
    }
}
