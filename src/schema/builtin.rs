//! Built-in form schemas.
//!
//! Field sets follow the printed IRS box layout for each form. Keys are the
//! normalized box identifiers used everywhere downstream (prompts, review
//! queue, exports). Schemas are published per tax year; a new filing season
//! gets a fresh set of entries even when the boxes did not change, so that
//! year-over-year layout changes never mutate history.

use super::{FieldDefinition, FormSchema, FormType, ValueKind};

/// Tax years with built-in schemas.
const BUILTIN_YEARS: &[i32] = &[2024, 2025];

fn money(key: &str, label: &str, required: bool) -> FieldDefinition {
    FieldDefinition::new(key, label, ValueKind::Money, required)
}

fn text(key: &str, label: &str, required: bool) -> FieldDefinition {
    FieldDefinition::new(key, label, ValueKind::Text, required)
}

fn date(key: &str, label: &str, required: bool) -> FieldDefinition {
    FieldDefinition::new(key, label, ValueKind::Date, required)
}

fn boolean(key: &str, label: &str) -> FieldDefinition {
    FieldDefinition::new(key, label, ValueKind::Boolean, false)
}

/// All built-in schemas, one per (form type, year).
pub fn builtin_schemas() -> Vec<FormSchema> {
    let mut schemas = Vec::new();
    for &year in BUILTIN_YEARS {
        schemas.push(FormSchema::new(FormType::W2, year, w2_fields()));
        schemas.push(FormSchema::new(FormType::Nec1099, year, nec_fields()));
        schemas.push(FormSchema::new(FormType::Int1099, year, int_fields()));
        schemas.push(FormSchema::new(FormType::Div1099, year, div_fields()));
        schemas.push(FormSchema::new(FormType::B1099, year, b_fields()));
        schemas.push(FormSchema::new(FormType::R1099, year, r_fields()));
        schemas.push(FormSchema::new(FormType::Da1099, year, da_fields()));
        schemas.push(FormSchema::new(FormType::K1, year, k1_fields()));
        schemas.push(FormSchema::new(FormType::F1040, year, f1040_fields()));
    }
    schemas
}

fn w2_fields() -> Vec<FieldDefinition> {
    vec![
        text("employer_name", "Employer's name", true),
        text("employer_ein", "Employer identification number (EIN)", true),
        text("employee_ssn", "Employee's social security number", true),
        money("box_1_wages", "Wages, tips, other compensation", true),
        money("box_2_federal_withheld", "Federal income tax withheld", true),
        money("box_16_state_wages", "State wages, tips, etc.", false),
        money("box_17_state_withheld", "State income tax", false),
        money("box_18_local_wages", "Local wages, tips, etc.", false),
    ]
}

fn nec_fields() -> Vec<FieldDefinition> {
    vec![
        text("payer_name", "Payer's name", true),
        text("payer_tin", "Payer's TIN", true),
        text("recipient_tin", "Recipient's TIN", true),
        money("nonemployee_compensation", "Nonemployee compensation", true),
        money("federal_withheld", "Federal income tax withheld", false),
        money("state_income", "State income", false),
    ]
}

fn int_fields() -> Vec<FieldDefinition> {
    vec![
        text("payer_name", "Payer's name", true),
        text("payer_tin", "Payer's TIN", true),
        text("recipient_tin", "Recipient's TIN", true),
        money("interest_income", "Interest income", true),
        money("early_withdrawal_penalty", "Early withdrawal penalty", false),
        money("us_bond_interest", "Interest on U.S. Savings Bonds and Treasury obligations", false),
        money("federal_withheld", "Federal income tax withheld", false),
        money("tax_exempt_interest", "Tax-exempt interest", false),
    ]
}

fn div_fields() -> Vec<FieldDefinition> {
    vec![
        text("payer_name", "Payer's name", true),
        text("payer_tin", "Payer's TIN", true),
        text("recipient_tin", "Recipient's TIN", true),
        money("total_ordinary_dividends", "Total ordinary dividends", true),
        money("qualified_dividends", "Qualified dividends", false),
        money("total_capital_gain", "Total capital gain distributions", false),
        money("federal_withheld", "Federal income tax withheld", false),
        money("foreign_tax_paid", "Foreign tax paid", false),
    ]
}

fn b_fields() -> Vec<FieldDefinition> {
    vec![
        text("payer_name", "Payer's name", true),
        text("payer_tin", "Payer's TIN", true),
        text("recipient_tin", "Recipient's TIN", true),
        text("description", "Description of property", true),
        date("date_acquired", "Date acquired", false),
        date("date_sold", "Date sold or disposed", false),
        money("proceeds", "Proceeds", true),
        money("cost_basis", "Cost or other basis", false),
        money("federal_withheld", "Federal income tax withheld", false),
        boolean("basis_reported_to_irs", "Basis reported to IRS"),
        boolean("noncovered", "Noncovered security"),
    ]
}

fn r_fields() -> Vec<FieldDefinition> {
    vec![
        text("payer_name", "Payer's name", true),
        text("payer_tin", "Payer's TIN", true),
        text("recipient_tin", "Recipient's TIN", true),
        money("gross_distribution", "Gross distribution", true),
        money("taxable_amount", "Taxable amount", false),
        money("federal_withheld", "Federal income tax withheld", false),
        FieldDefinition::enumerated(
            "distribution_code",
            "Distribution code(s)",
            false,
            &["1", "2", "3", "4", "5", "6", "7", "8", "G", "H", "J", "Q", "T"],
        ),
        boolean("ira_sep_simple", "IRA/SEP/SIMPLE"),
    ]
}

fn da_fields() -> Vec<FieldDefinition> {
    vec![
        text("payer_name", "Payer's name", true),
        text("payer_tin", "Payer's TIN", true),
        text("recipient_name", "Recipient's name", false),
        text("recipient_tin", "Recipient's TIN", true),
        text("account_number", "Account number", false),
        text("asset_name", "Name of digital asset", true),
        // Units keep full precision as text; crypto quantities exceed
        // two-decimal fixed point.
        text("units", "Number of units", false),
        date("date_acquired", "Date acquired", false),
        date("date_sold", "Date sold or disposed", false),
        money("proceeds", "Proceeds", true),
        money("cost_basis", "Cost or other basis", false),
        money("federal_withheld", "Federal income tax withheld", false),
        boolean("basis_reported_to_irs", "Basis reported to IRS"),
        boolean("noncovered", "Noncovered digital asset"),
        money("wash_sale_disallowed", "Wash sale loss disallowed", false),
    ]
}

fn k1_fields() -> Vec<FieldDefinition> {
    vec![
        text("partnership_name", "Partnership's name", true),
        text("partnership_ein", "Partnership's EIN", true),
        text("partner_name", "Partner's name", true),
        text("partner_ssn", "Partner's SSN or TIN", false),
        FieldDefinition::enumerated(
            "partner_type",
            "General partner or limited partner",
            false,
            &["general", "limited"],
        ),
        text("profit_sharing_pct", "Partner's share of profit", false),
        money("ordinary_income", "Ordinary business income (loss)", false),
        money("net_rental_income", "Net rental real estate income (loss)", false),
        money("guaranteed_payments", "Guaranteed payments", false),
        money("interest_income", "Interest income", false),
        money("dividends", "Ordinary dividends", false),
        money("net_short_term_gain", "Net short-term capital gain (loss)", false),
        money("net_long_term_gain", "Net long-term capital gain (loss)", false),
        money("self_employment_earnings", "Self-employment earnings (loss)", false),
        money("beginning_capital", "Beginning capital account", false),
        money("ending_capital", "Ending capital account", false),
    ]
}

fn f1040_fields() -> Vec<FieldDefinition> {
    vec![
        FieldDefinition::enumerated(
            "filing_status",
            "Filing status",
            true,
            &[
                "single",
                "married_filing_jointly",
                "married_filing_separately",
                "head_of_household",
                "qualifying_surviving_spouse",
            ],
        ),
        money("total_income", "Total income", false),
        money("adjusted_gross_income", "Adjusted gross income", false),
        money("taxable_income", "Taxable income", false),
        money("total_tax", "Total tax", false),
        money("federal_withheld", "Federal income tax withheld", false),
    ]
}
