use percent_encoding::percent_decode_str;

/// How a navigation relates to the expected OAuth redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// Not the redirect yet.
    Intermediate,
    Code(String),
    /// Reached the redirect without a usable code.
    Rejected(String),
}

pub fn classify(url: &str, redirect_prefix: &str, code_param: &str) -> Redirect {
    if !url.starts_with(redirect_prefix) {
        return Redirect::Intermediate;
    }
    let params = query_params(url);
    let lookup = |name: &str| {
        params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    };

    if let Some(error) = lookup("error") {
        let reason = lookup("error_description").unwrap_or(error);
        return Redirect::Rejected(reason);
    }
    match lookup(code_param) {
        Some(code) if !code.is_empty() => Redirect::Code(code),
        _ => Redirect::Rejected(format!("redirect carried no {code_param}")),
    }
}

/// Decoded `key=value` pairs of the query string, fragment excluded.
pub fn query_params(url: &str) -> Vec<(String, String)> {
    let Some((_, rest)) = url.split_once('?') else {
        return Vec::new();
    };
    let query = rest.split('#').next().unwrap_or_default();
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(k), decode(v))
        })
        .collect()
}

fn decode(s: &str) -> String {
    let s = s.replace('+', " ");
    percent_decode_str(&s).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPIC: &str = "http://localhost/launcher/authorized";

    #[test]
    fn extracts_code() {
        assert_eq!(
            classify(&format!("{EPIC}?code=abc%2F123&state=x"), EPIC, "code"),
            Redirect::Code("abc/123".into())
        );
    }

    #[test]
    fn other_pages_are_intermediate() {
        assert_eq!(
            classify("https://www.epicgames.com/id/login?code=nope", EPIC, "code"),
            Redirect::Intermediate
        );
    }

    #[test]
    fn redirect_without_code_is_rejected() {
        assert!(matches!(classify(EPIC, EPIC, "code"), Redirect::Rejected(_)));
        assert_eq!(
            classify(
                &format!("{EPIC}?error=access_denied&error_description=User+declined"),
                EPIC,
                "code"
            ),
            Redirect::Rejected("User declined".into())
        );
    }

    #[test]
    fn dotted_param_names() {
        let url = "https://www.amazon.com/?openid.oa2.authorization_code=ANcode#frag";
        assert_eq!(
            classify(url, "https://www.amazon.com/", "openid.oa2.authorization_code"),
            Redirect::Code("ANcode".into())
        );
    }
}
