use colored::Colorize;
use erp_idp::protocol::IdTokenClaims;
use erp_idp::{DiscoveryDocument, ExtAuthChallengeSession, IdpToken, KkAppEntry, PairingEntry};
use tabled::builder::Builder;
use tabled::settings::Style;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use url::Url;

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_field(label: &str, value: impl std::fmt::Display) {
    println!("{}: {}", label.cyan(), value);
}

fn format_time(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
}

/// Shortens a token for display.
pub fn preview(token: &str) -> String {
    if token.len() > 20 {
        format!("{}...{}", &token[..8], &token[token.len() - 8..])
    } else {
        "*".repeat(token.len())
    }
}

pub fn print_token(token: &IdpToken, claims: Option<&IdTokenClaims>) {
    if let Some(claims) = claims {
        let name = match (&claims.given_name, &claims.family_name) {
            (Some(given), Some(family)) => format!("{given} {family}"),
            (Some(name), None) | (None, Some(name)) => name.clone(),
            (None, None) => "-".to_string(),
        };
        print_field("Insurant", name);
        print_field("KVNR", claims.id_number.as_deref().unwrap_or("-"));
        print_field("Insurer", claims.organization_name.as_deref().unwrap_or("-"));
        if !claims.amr.is_empty() {
            print_field("Methods", claims.amr.join(", "));
        }
    }
    print_field("Access token", preview(&token.access_token));
    print_field(
        "SSO token",
        if token.sso_token.is_some() { "present" } else { "absent" },
    );

    let expires = format_time(token.expires);
    if token.is_expired() {
        print_field("Expires", format!("{expires} ({})", "expired".red()));
    } else {
        let remaining = token.expires_in().as_secs();
        print_field(
            "Expires",
            format!("{expires} ({}m {}s left)", remaining / 60, remaining % 60),
        );
    }
}

pub fn print_discovery(document: &DiscoveryDocument) {
    fn optional(url: Option<&Url>) -> String {
        url.map_or_else(|| "(not offered)".to_string(), Url::to_string)
    }

    print_field("Issuer", &document.issuer);
    print_field("Authorization", &document.authorization_endpoint);
    print_field("SSO", &document.sso_endpoint);
    print_field("Token", &document.token_endpoint);
    print_field("Signing key", &document.uri_puk_idp_sig);
    print_field("Pairing", optional(document.uri_pair.as_ref()));
    print_field("Alternative auth", optional(document.auth_pair_endpoint.as_ref()));
    print_field("Insurer apps", optional(document.kk_app_list_uri.as_ref()));
    print_field(
        "Third party auth",
        optional(document.third_party_authorization_endpoint.as_ref()),
    );
    print_field("Scopes", document.scopes_supported.join(" "));
    print_field("Valid until", format_time(document.exp));
}

pub fn print_kk_apps(apps: &[KkAppEntry]) {
    if apps.is_empty() {
        println!("No insurer apps offered.");
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(["Name", "Identifier"]);
    for app in apps {
        builder.push_record([app.name.as_str(), app.identifier.as_str()]);
    }
    println!("{}", builder.build().with(Style::rounded()));
}

pub fn print_ext_auth_requests(requests: &[ExtAuthChallengeSession]) {
    if requests.is_empty() {
        println!("No pending requests.");
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(["Insurer app", "Identifier", "State"]);
    for request in requests {
        builder.push_record([
            request.entry.name.as_str(),
            request.entry.identifier.as_str(),
            request.state.as_str(),
        ]);
    }
    println!("{}", builder.build().with(Style::rounded()));
}

pub fn print_devices(entries: &[PairingEntry]) {
    if entries.is_empty() {
        println!("No paired devices.");
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(["Name", "Key identifier", "Paired at"]);
    for entry in entries {
        let created = OffsetDateTime::from_unix_timestamp(entry.creation_time)
            .map_or_else(|_| entry.creation_time.to_string(), format_time);
        builder.push_record([
            entry.name.clone(),
            entry.key_identifier().unwrap_or_else(|| "-".to_string()),
            created,
        ]);
    }
    println!("{}", builder.build().with(Style::rounded()));
}
