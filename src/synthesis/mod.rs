// Document synthesis module
// Derives embedding-ready natural-language documents from the sales tables


use chrono::Datelike;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::dataset::{Table, Workbook};

pub const SALES_SHEET: &str = "Ventas";
pub const PRODUCTS_SHEET: &str = "Productos";
pub const CUSTOMERS_SHEET: &str = "Clientes";

/// A document ready for embedding, with provenance metadata. Immutable once
/// created; text is never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    fn new(text: String, metadata: &[(&str, &str)]) -> Self {
        Self {
            text,
            metadata: metadata
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    /// Provenance label used to populate answer sources.
    #[inline]
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").map(String::as_str)
    }
}

/// Synthesis policy, chosen once per deployment. Summary produces a single
/// dense pre-aggregated report so the model can answer numeric questions
/// without aggregating across fragments; row mode emits one document per
/// spreadsheet row for datasets lacking the fixed three-table shape.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisMode {
    Summary,
    Row,
}

/// Synthesize documents from the workbook in the given mode.
#[inline]
pub fn synthesize(workbook: &Workbook, mode: SynthesisMode, chunk_size: usize) -> Vec<Document> {
    match mode {
        SynthesisMode::Summary => synthesize_summary(workbook),
        SynthesisMode::Row => synthesize_rows(workbook, chunk_size),
    }
}

/// One joined sales transaction with derived fields.
#[derive(Debug, Clone)]
struct SaleRecord {
    product_name: String,
    category: String,
    customer_name: String,
    city: String,
    quantity: f64,
    amount: f64,
    year: i32,
    month_key: String,
}

#[derive(Debug, Default, Clone)]
struct Aggregate {
    count: usize,
    units: f64,
    revenue: f64,
}

/// Build the single summary document from the three required sheets.
/// Returns an empty vec (never a partial summary) when any required sheet or
/// column is missing; the index builder reports that condition up the stack.
#[inline]
pub fn synthesize_summary(workbook: &Workbook) -> Vec<Document> {
    let (Some(sales), Some(products), Some(customers)) = (
        workbook.table(SALES_SHEET),
        workbook.table(PRODUCTS_SHEET),
        workbook.table(CUSTOMERS_SHEET),
    ) else {
        warn!(
            "Summary synthesis requires sheets '{}', '{}' and '{}'; got: {:?}",
            SALES_SHEET,
            PRODUCTS_SHEET,
            CUSTOMERS_SHEET,
            workbook.tables.keys().collect::<Vec<_>>()
        );
        return Vec::new();
    };

    let Some(records) = join_sales(sales, products, customers) else {
        return Vec::new();
    };

    info!(
        "Synthesizing summary document from {} joined transactions",
        records.len()
    );

    let text = render_summary(sales, products, customers, &records);
    vec![Document::new(
        text,
        &[
            ("type", "complete"),
            ("priority", "highest"),
            ("source", "resumen-ventas"),
        ],
    )]
}

fn join_sales(sales: &Table, products: &Table, customers: &Table) -> Option<Vec<SaleRecord>> {
    let product_id = required_column(products, "IdProducto")?;
    let product_name = required_column(products, "NombreProducto")?;
    let product_category = required_column(products, "Categoria")?;
    let customer_id = required_column(customers, "IdCliente")?;
    let customer_name = required_column(customers, "NombreCliente")?;
    let customer_city = required_column(customers, "Ciudad")?;
    let sale_product = required_column(sales, "IdProducto")?;
    let sale_customer = required_column(sales, "IdCliente")?;
    let sale_quantity = required_column(sales, "Cantidad")?;
    let sale_price = required_column(sales, "Precio")?;
    let sale_date = required_column(sales, "FechaVenta")?;

    let products_by_id: BTreeMap<String, (String, String)> = products
        .rows
        .iter()
        .map(|row| {
            (
                row[product_id].to_string(),
                (row[product_name].to_string(), row[product_category].to_string()),
            )
        })
        .collect();

    let customers_by_id: BTreeMap<String, (String, String)> = customers
        .rows
        .iter()
        .map(|row| {
            (
                row[customer_id].to_string(),
                (row[customer_name].to_string(), row[customer_city].to_string()),
            )
        })
        .collect();

    let mut records = Vec::with_capacity(sales.row_count());
    for (i, row) in sales.rows.iter().enumerate() {
        let Some((product, category)) = products_by_id.get(&row[sale_product].to_string()) else {
            warn!("Sale row {} references unknown product, skipping", i);
            continue;
        };
        let Some((customer, city)) = customers_by_id.get(&row[sale_customer].to_string()) else {
            warn!("Sale row {} references unknown customer, skipping", i);
            continue;
        };
        let (Some(quantity), Some(price), Some(date)) = (
            row[sale_quantity].as_f64(),
            row[sale_price].as_f64(),
            row[sale_date].as_date(),
        ) else {
            warn!("Sale row {} has malformed quantity/price/date, skipping", i);
            continue;
        };

        records.push(SaleRecord {
            product_name: product.clone(),
            category: category.clone(),
            customer_name: customer.clone(),
            city: city.clone(),
            quantity,
            amount: quantity * price,
            year: date.year(),
            month_key: date.format("%Y-%m").to_string(),
        });
    }

    Some(records)
}

fn required_column(table: &Table, name: &str) -> Option<usize> {
    let index = table.column_index(name);
    if index.is_none() {
        warn!("Sheet '{}' is missing required column '{}'", table.name, name);
    }
    index
}

fn render_summary(
    sales: &Table,
    products: &Table,
    customers: &Table,
    records: &[SaleRecord],
) -> String {
    let total_revenue: f64 = records.iter().map(|r| r.amount).sum();
    let total_units: f64 = records.iter().map(|r| r.quantity).sum();
    let average_ticket = if records.is_empty() {
        0.0
    } else {
        total_revenue / records.len() as f64
    };

    let by_product = aggregate_by(records, |r| r.product_name.clone());
    let by_category = aggregate_by(records, |r| r.category.clone());
    let by_customer = aggregate_by(records, |r| r.customer_name.clone());
    let by_city = aggregate_by(records, |r| r.city.clone());
    let by_year = aggregate_by(records, |r| r.year.to_string());
    let by_month = aggregate_by(records, |r| r.month_key.clone());

    let categories = unique_values(products, "Categoria");
    let cities = unique_values(customers, "Ciudad");

    let mut report = String::new();

    report.push_str("=== BASE DE DATOS COMPLETA DE VENTAS ===\n\n");

    report.push_str("1. RESUMEN GENERAL:\n");
    report.push_str(&format!("Total ventas: {}\n", sales.row_count()));
    report.push_str(&format!(
        "Ingresos totales: ${}\n",
        format_currency(total_revenue)
    ));
    report.push_str(&format!("Ticket promedio: ${:.2}\n", average_ticket));
    report.push_str(&format!("Unidades vendidas: {}\n\n", total_units as i64));

    report.push_str(&format!("2. PRODUCTOS ({} productos):\n", products.row_count()));
    report.push_str(&format!("Categorías: {}\n", categories.join(", ")));
    if let Some((name, agg)) = top_entry(&by_product, |a| a.units) {
        report.push_str(&format!(
            "Producto más vendido (unidades): {} ({} unidades)\n",
            name, agg.units as i64
        ));
    }
    if let Some((name, agg)) = top_entry(&by_product, |a| a.revenue) {
        report.push_str(&format!(
            "Producto más vendido (ingresos): {} (${})\n",
            name,
            format_currency(agg.revenue)
        ));
    }
    report.push_str("\nTop 10 productos por ventas:\n");
    for (name, agg) in top_n(&by_product, 10) {
        report.push_str(&format!(
            "- {}: {} unidades, ${}\n",
            name,
            agg.units as i64,
            format_currency(agg.revenue)
        ));
    }
    report.push_str("\nVentas por categoría:\n");
    for (name, agg) in top_n(&by_category, usize::MAX) {
        report.push_str(&format!("- {}: ${}\n", name, format_currency(agg.revenue)));
    }

    report.push_str(&format!("\n3. CLIENTES ({} clientes):\n", customers.row_count()));
    report.push_str(&format!("Ciudades: {}\n", cities.join(", ")));
    if let Some((name, agg)) = top_entry(&by_customer, |a| a.count as f64) {
        report.push_str(&format!(
            "Cliente con más compras: {} ({} compras)\n",
            name, agg.count
        ));
    }
    if let Some((name, agg)) = top_entry(&by_customer, |a| a.revenue) {
        report.push_str(&format!(
            "Cliente con más ingresos: {} (${})\n",
            name,
            format_currency(agg.revenue)
        ));
    }
    report.push_str("\nTop 10 clientes:\n");
    for (name, agg) in top_n(&by_customer, 10) {
        report.push_str(&format!(
            "- {}: {} compras, ${}\n",
            name,
            agg.count,
            format_currency(agg.revenue)
        ));
    }
    report.push_str("\nVentas por ciudad:\n");
    for (name, agg) in top_n(&by_city, usize::MAX) {
        report.push_str(&format!(
            "- {}: {} ventas, ${}\n",
            name,
            agg.count,
            format_currency(agg.revenue)
        ));
    }

    report.push_str("\n4. ANÁLISIS TEMPORAL:\n");
    report.push_str("VENTAS POR AÑO (número de transacciones):\n");
    for (year, agg) in &by_year {
        report.push_str(&format!("- Año {}: {} ventas\n", year, agg.count));
    }
    report.push_str("\nDetalle por año:\n");
    for (year, agg) in &by_year {
        report.push_str(&format!(
            "- {}: {} ventas, ${}, {} unidades\n",
            year,
            agg.count,
            format_currency(agg.revenue),
            agg.units as i64
        ));
    }
    report.push_str("\nVentas por mes (YYYY-MM, número de transacciones):\n");
    for (month, agg) in &by_month {
        report.push_str(&format!(
            "- {}: {} ventas, ${}\n",
            month,
            agg.count,
            format_currency(agg.revenue)
        ));
    }

    for (year, agg) in &by_year {
        report.push_str(&format!("\n5. DETALLE POR AÑO {}:\n", year));
        report.push_str(&format!("Transacciones: {}\n", agg.count));
        report.push_str(&format!("Ingresos: ${}\n", format_currency(agg.revenue)));

        let year_records: Vec<SaleRecord> = records
            .iter()
            .filter(|r| r.year.to_string() == *year)
            .cloned()
            .collect();
        let year_products = aggregate_by(&year_records, |r| r.product_name.clone());
        let top3 = top_n(&year_products, 3)
            .into_iter()
            .map(|(name, agg)| format!("{} (${})", name, format_currency(agg.revenue)))
            .join(", ");
        report.push_str(&format!("Top 3 productos {}: {}\n", year, top3));
    }

    report.push_str(
        "\nNOTA: Los datos NO incluyen información sobre vendedores, canales de venta, \
         formas de pago ni locales/sucursales específicos. Solo se tiene información de \
         productos, clientes (con ciudades) y fechas de venta.",
    );

    report
}

fn aggregate_by<F>(records: &[SaleRecord], key: F) -> BTreeMap<String, Aggregate>
where
    F: Fn(&SaleRecord) -> String,
{
    let mut aggregates: BTreeMap<String, Aggregate> = BTreeMap::new();
    for record in records {
        let entry = aggregates.entry(key(record)).or_default();
        entry.count += 1;
        entry.units += record.quantity;
        entry.revenue += record.amount;
    }
    aggregates
}

/// Entries ordered by descending revenue (name-ascending tiebreak), capped at n.
fn top_n(aggregates: &BTreeMap<String, Aggregate>, n: usize) -> Vec<(&String, &Aggregate)> {
    aggregates
        .iter()
        .sorted_by(|(name_a, a), (name_b, b)| {
            b.revenue
                .partial_cmp(&a.revenue)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| name_a.cmp(name_b))
        })
        .take(n)
        .collect()
}

fn top_entry<F>(
    aggregates: &BTreeMap<String, Aggregate>,
    metric: F,
) -> Option<(&String, &Aggregate)>
where
    F: Fn(&Aggregate) -> f64,
{
    aggregates.iter().max_by(|(_, a), (_, b)| {
        metric(a)
            .partial_cmp(&metric(b))
            .unwrap_or(std::cmp::Ordering::Equal)
    })
}

fn unique_values(table: &Table, column: &str) -> Vec<String> {
    let Some(index) = table.column_index(column) else {
        return Vec::new();
    };
    table
        .rows
        .iter()
        .map(|row| row[index].to_string())
        .unique()
        .collect()
}

/// Format a monetary amount with thousands separators and two decimals.
fn format_currency(value: f64) -> String {
    let formatted = format!("{:.2}", value);
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));
    let (sign, digits) = int_part
        .strip_prefix('-')
        .map_or(("", int_part), |rest| ("-", rest));

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    format!("{}{}.{}", sign, grouped, frac_part)
}

/// Emit one document per spreadsheet row across every table, chunking texts
/// that exceed `chunk_size` characters.
#[inline]
pub fn synthesize_rows(workbook: &Workbook, chunk_size: usize) -> Vec<Document> {
    let mut documents = Vec::new();

    for table in workbook.tables.values() {
        for (row_index, row) in table.rows.iter().enumerate() {
            let text = row_to_text(table, row);
            let source = format!("{}:{}", table.name, row_index + 1);
            let chunks = chunk_text(&text, chunk_size);
            let chunked = chunks.len() > 1;

            for (chunk_index, chunk) in chunks.into_iter().enumerate() {
                let mut document = Document::new(
                    chunk,
                    &[
                        ("type", "detail"),
                        ("table", table.name.as_str()),
                        ("source", source.as_str()),
                    ],
                );
                if chunked {
                    document
                        .metadata
                        .insert("chunk".to_string(), chunk_index.to_string());
                }
                documents.push(document);
            }
        }
    }

    debug!("Row synthesis produced {} documents", documents.len());
    documents
}

fn row_to_text(table: &Table, row: &[crate::dataset::CellValue]) -> String {
    let mut parts = vec![format!("Tabla: {}", table.name)];
    for (column, value) in table.columns.iter().zip(row.iter()) {
        parts.push(format!("{}: {}", column, value));
    }
    parts.join(" | ")
}

/// Split text into successive chunks of at most `size` characters,
/// preserving order. Concatenating the chunks reproduces the input.
fn chunk_text(text: &str, size: usize) -> Vec<String> {
    if size == 0 || text.chars().count() <= size {
        return vec![text.to_string()];
    }

    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
