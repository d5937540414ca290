//! Default message templates for the built-in rules

/// Template used when a rule has neither a custom message nor a default
pub const FALLBACK_TEMPLATE: &str = "The {field} field is invalid.";

/// Default English template for a rule name
pub fn default_template(rule: &str) -> Option<&'static str> {
    let template = match rule {
        "required" => "The {field} field is required.",
        "min_length" => "The {field} field must be at least {param} characters in length.",
        "max_length" => "The {field} field cannot exceed {param} characters in length.",
        "exact_length" => "The {field} field must be exactly {param} characters in length.",
        "numeric" => "The {field} field must contain only numbers.",
        "integer" => "The {field} field must contain an integer.",
        "decimal" => "The {field} field must contain a decimal number.",
        "is_natural" => "The {field} field must only contain digits.",
        "is_natural_no_zero" => "The {field} field must only contain digits and must be greater than zero.",
        "alpha" => "The {field} field may only contain alphabetical characters.",
        "alpha_dash" => "The {field} field may only contain alphanumeric, underscore, and dash characters.",
        "alpha_numeric" => "The {field} field may only contain alphanumeric characters.",
        "alpha_numeric_space" => "The {field} field may only contain alphanumeric and space characters.",
        "valid_email" => "The {field} field must contain a valid email address.",
        "regex_match" => "The {field} field is not in the correct format.",
        "in_list" => "The {field} field must be one of: {param}.",
        "matches" => "The {field} field does not match the {param} field.",
        "differs" => "The {field} field must differ from the {param} field.",
        "greater_than" => "The {field} field must contain a number greater than {param}.",
        "greater_than_equal_to" => "The {field} field must contain a number greater than or equal to {param}.",
        "less_than" => "The {field} field must contain a number less than {param}.",
        "less_than_equal_to" => "The {field} field must contain a number less than or equal to {param}.",
        _ => return None,
    };
    Some(template)
}

/// Fill `{field}`, `{param}` and `{value}` in a template
pub fn render(template: &str, field: &str, param: Option<&str>, value: &str) -> String {
    template
        .replace("{field}", field)
        .replace("{param}", param.unwrap_or(""))
        .replace("{value}", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_required() {
        let template = default_template("required").unwrap();
        assert_eq!(render(template, "email", None, ""), "The email field is required.");
    }

    #[test]
    fn test_render_with_param_and_value() {
        let message = render("{field} got {value}, wanted {param}", "Age", Some("18"), "12");
        assert_eq!(message, "Age got 12, wanted 18");
    }

    #[test]
    fn test_unknown_rule_has_no_template() {
        assert!(default_template("frobnicate").is_none());
    }
}
