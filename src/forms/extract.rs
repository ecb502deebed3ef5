use crate::forms::FieldErrors;
use crate::query::request::{ExtractRequest, SchemaVersion};
use chrono::NaiveDate;
use serde::Deserialize;

/// Longest URL pattern accepted, in characters.
pub const MAX_URL_CHARS: usize = 256;

/// Date format of the joined day/month/year inputs.
const DATE_FORMAT: &str = "%d %m %Y";

/// Submitted extract form. The date inputs follow the GOV.UK date pattern:
/// three separate `<name>-day`, `<name>-month` and `<name>-year` fields.
///
/// The estimate page echoes these same fields back as hidden inputs, so the
/// download step validates exactly what the estimate was computed for.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractForm {
    #[serde(default)]
    pub desired_url: String,
    #[serde(default, rename = "start_date-day")]
    pub start_day: String,
    #[serde(default, rename = "start_date-month")]
    pub start_month: String,
    #[serde(default, rename = "start_date-year")]
    pub start_year: String,
    #[serde(default, rename = "end_date-day")]
    pub end_day: String,
    #[serde(default, rename = "end_date-month")]
    pub end_month: String,
    #[serde(default, rename = "end_date-year")]
    pub end_year: String,
    #[serde(default)]
    pub ga_toggle: String,
    #[serde(default)]
    pub csrf_token: String,
}

impl ExtractForm {
    /// Value the schema selector should show as selected.
    pub fn selected_schema(&self) -> &str {
        if self.ga_toggle.is_empty() {
            SchemaVersion::default().as_str()
        } else {
            &self.ga_toggle
        }
    }

    /// Validate every field, collecting all messages rather than stopping at
    /// the first.
    pub fn validate(&self) -> Result<ExtractRequest, FieldErrors> {
        let mut errors = FieldErrors::default();

        let desired_url = validate_url(&self.desired_url)
            .map_err(|m| errors.add("desired_url", m))
            .ok();
        let start_date = parse_date(&self.start_day, &self.start_month, &self.start_year, "start")
            .map_err(|m| errors.add("start_date", m))
            .ok();
        let end_date = parse_date(&self.end_day, &self.end_month, &self.end_year, "end")
            .map_err(|m| errors.add("end_date", m))
            .ok();
        let schema_version = parse_schema(&self.ga_toggle)
            .map_err(|m| errors.add("ga_toggle", m))
            .ok();

        if let (Some(start), Some(end)) = (start_date, end_date) {
            if end < start {
                errors.add(
                    "end_date",
                    "End date must be the same as or after the start date",
                );
            }
        }

        match (desired_url, start_date, end_date, schema_version) {
            (Some(desired_url), Some(start_date), Some(end_date), Some(schema_version))
                if errors.is_empty() =>
            {
                Ok(ExtractRequest {
                    desired_url,
                    start_date,
                    end_date,
                    schema_version,
                })
            }
            _ => Err(errors),
        }
    }
}

fn validate_url(value: &str) -> Result<String, &'static str> {
    if value.trim().is_empty() {
        return Err("Enter a desired url");
    }
    if value.chars().count() > MAX_URL_CHARS {
        return Err("URL must be 256 characters or fewer");
    }
    if !value.starts_with('/') {
        return Err("URL must start with /");
    }
    Ok(value.to_string())
}

/// Parse GOV.UK day/month/year inputs. `which` is `start` or `end` and only
/// shapes the message.
fn parse_date(day: &str, month: &str, year: &str, which: &str) -> Result<NaiveDate, String> {
    let (day, month, year) = (day.trim(), month.trim(), year.trim());
    if day.is_empty() && month.is_empty() && year.is_empty() {
        return Err(format!("Enter the {which} date"));
    }
    if day.is_empty() || month.is_empty() || year.is_empty() {
        return Err(format!(
            "The {which} date must include a day, month and year"
        ));
    }
    if year.len() != 4 {
        return Err(format!("The {which} year must include 4 numbers"));
    }
    parse_date_text(&format!("{day} {month} {year}"))
        .ok_or_else(|| format!("The {which} date must be a real date"))
}

/// Parse a `DD MM YYYY` string as produced by joining the three inputs.
pub fn parse_date_text(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, DATE_FORMAT).ok()
}

fn parse_schema(value: &str) -> Result<SchemaVersion, &'static str> {
    if value.trim().is_empty() {
        return Err("Select a Google Analytics version");
    }
    value.trim().parse().map_err(|_| "Not a valid choice")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_form() -> ExtractForm {
        ExtractForm {
            desired_url: "/apply".to_string(),
            start_day: "01".to_string(),
            start_month: "01".to_string(),
            start_year: "2024".to_string(),
            end_day: "07".to_string(),
            end_month: "01".to_string(),
            end_year: "2024".to_string(),
            ga_toggle: "ga4".to_string(),
            csrf_token: String::new(),
        }
    }

    #[test]
    fn test_valid_form() {
        let req = valid_form().validate().unwrap();
        assert_eq!(req.desired_url, "/apply");
        assert_eq!(req.start_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(req.end_date, NaiveDate::from_ymd_opt(2024, 1, 7).unwrap());
        assert_eq!(req.schema_version, SchemaVersion::Ga4);
    }

    #[test]
    fn test_parse_date_text() {
        assert_eq!(
            parse_date_text("01 01 2024"),
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
        assert_eq!(
            parse_date_text("3 3 2024"),
            NaiveDate::from_ymd_opt(2024, 3, 3)
        );
        assert_eq!(parse_date_text("31 02 2024"), None);
    }

    #[test]
    fn test_url_boundary() {
        let mut form = valid_form();
        form.desired_url = format!("/{}", "a".repeat(MAX_URL_CHARS - 1));
        assert!(form.validate().is_ok());

        form.desired_url = format!("/{}", "a".repeat(MAX_URL_CHARS));
        let errors = form.validate().unwrap_err();
        assert_eq!(
            errors.get("desired_url"),
            Some("URL must be 256 characters or fewer")
        );
    }

    #[test]
    fn test_url_length_counts_characters() {
        let mut form = valid_form();
        form.desired_url = format!("/{}", "é".repeat(MAX_URL_CHARS - 1));
        assert!(form.validate().is_ok());
    }

    #[test]
    fn test_url_required() {
        let mut form = valid_form();
        form.desired_url = String::new();
        let errors = form.validate().unwrap_err();
        assert_eq!(errors.get("desired_url"), Some("Enter a desired url"));
    }

    #[test]
    fn test_url_must_start_with_slash() {
        let mut form = valid_form();
        form.desired_url = "apply".to_string();
        let errors = form.validate().unwrap_err();
        assert_eq!(errors.get("desired_url"), Some("URL must start with /"));
    }

    #[test]
    fn test_missing_dates() {
        let mut form = valid_form();
        form.start_day.clear();
        form.start_month.clear();
        form.start_year.clear();
        form.end_year.clear();
        let errors = form.validate().unwrap_err();
        assert_eq!(errors.get("start_date"), Some("Enter the start date"));
        assert_eq!(
            errors.get("end_date"),
            Some("The end date must include a day, month and year")
        );
    }

    #[test]
    fn test_impossible_date() {
        let mut form = valid_form();
        form.start_day = "30".to_string();
        form.start_month = "02".to_string();
        let errors = form.validate().unwrap_err();
        assert_eq!(
            errors.get("start_date"),
            Some("The start date must be a real date")
        );
    }

    #[test]
    fn test_two_digit_year_rejected() {
        let mut form = valid_form();
        form.end_year = "24".to_string();
        let errors = form.validate().unwrap_err();
        assert_eq!(
            errors.get("end_date"),
            Some("The end year must include 4 numbers")
        );
    }

    #[test]
    fn test_end_before_start_rejected() {
        let mut form = valid_form();
        form.start_day = "07".to_string();
        form.end_day = "01".to_string();
        let errors = form.validate().unwrap_err();
        assert_eq!(
            errors.get("end_date"),
            Some("End date must be the same as or after the start date")
        );
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_single_day_range_accepted() {
        let mut form = valid_form();
        form.end_day = "01".to_string();
        assert!(form.validate().is_ok());
    }

    #[test]
    fn test_schema_choice() {
        let mut form = valid_form();
        form.ga_toggle = "ua".to_string();
        assert_eq!(form.validate().unwrap().schema_version, SchemaVersion::Ua);

        form.ga_toggle = "ga3".to_string();
        assert_eq!(
            form.validate().unwrap_err().get("ga_toggle"),
            Some("Not a valid choice")
        );

        form.ga_toggle = String::new();
        assert_eq!(
            form.validate().unwrap_err().get("ga_toggle"),
            Some("Select a Google Analytics version")
        );
    }

    #[test]
    fn test_selected_schema_defaults_to_ua() {
        let form = ExtractForm::default();
        assert_eq!(form.selected_schema(), "ua");
        assert_eq!(valid_form().selected_schema(), "ga4");
    }

    #[test]
    fn test_all_errors_collected() {
        let errors = ExtractForm::default().validate().unwrap_err();
        assert_eq!(errors.len(), 4);
    }
}
