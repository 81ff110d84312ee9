//! `{{name}}` placeholder substitution for notification bodies.

use std::collections::HashMap;

/// Replace every `{{name}}` whose name is in `variables`.
///
/// Whitespace inside the braces is ignored. Unknown names and unterminated
/// braces are copied through unchanged, and substituted values are not
/// expanded again.
pub fn render(template: &str, variables: &HashMap<String, String>) -> String {
    if variables.is_empty() {
        return template.to_string();
    }

    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        let Some(end) = after_open.find("}}") else {
            output.push_str(&rest[start..]);
            return output;
        };

        let name = after_open[..end].trim();
        match variables.get(name) {
            Some(value) => output.push_str(value),
            None => output.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after_open[end + 2..];
    }

    output.push_str(rest);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_known_placeholders() {
        let rendered = render(
            "Hi {{client_name}}, invoice {{ invoice_number }} totals {{total}}.",
            &vars(&[
                ("client_name", "Bruce"),
                ("invoice_number", "INV-1000"),
                ("total", "5800.00"),
            ]),
        );
        assert_eq!(rendered, "Hi Bruce, invoice INV-1000 totals 5800.00.");
    }

    #[test]
    fn unknown_placeholders_are_left_alone() {
        let rendered = render(
            "Dear {{client_name}}, see {{portal_link}}",
            &vars(&[("client_name", "Bruce")]),
        );
        assert_eq!(rendered, "Dear Bruce, see {{portal_link}}");
    }

    #[test]
    fn unterminated_braces_are_copied() {
        let rendered = render("Total {{total", &vars(&[("total", "1")]));
        assert_eq!(rendered, "Total {{total");
    }

    #[test]
    fn values_are_not_expanded_twice() {
        let rendered = render(
            "{{a}} and {{b}}",
            &vars(&[("a", "{{b}}"), ("b", "bee")]),
        );
        assert_eq!(rendered, "{{b}} and bee");
    }

    #[test]
    fn repeated_placeholders_all_substitute() {
        let rendered = render("{{x}}-{{x}}", &vars(&[("x", "7")]));
        assert_eq!(rendered, "7-7");
    }
}
