use provx_core::{
    Config, Platform, ProvisioningProfile, ReconcileKind, Reconciled, Rejection, SaveOutcome,
};
use serde::Serialize;
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Ok,
    UserError,
    Failure,
}

impl CommandStatus {
    fn as_str(self) -> &'static str {
        match self {
            CommandStatus::Ok => "ok",
            CommandStatus::UserError => "user-error",
            CommandStatus::Failure => "error",
        }
    }

    fn code(self) -> i32 {
        match self {
            CommandStatus::Ok => 0,
            CommandStatus::UserError => 1,
            CommandStatus::Failure => 2,
        }
    }
}

/// What a command produced, rendered either as JSON or as text lines.
#[derive(Debug)]
pub struct Outcome {
    pub status: CommandStatus,
    pub message: String,
    pub details: Value,
    pub lines: Vec<String>,
}

impl Outcome {
    pub fn user_error(message: String) -> Self {
        Self {
            status: CommandStatus::UserError,
            message,
            details: json!({}),
            lines: Vec::new(),
        }
    }
}

pub fn emit(as_json: bool, outcome: &Outcome) -> color_eyre::Result<i32> {
    if as_json {
        let payload = json!({
            "status": outcome.status.as_str(),
            "message": outcome.message,
            "details": outcome.details,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if outcome.status == CommandStatus::Ok {
        println!("{}", outcome.message);
        for line in &outcome.lines {
            println!("{line}");
        }
    } else {
        eprintln!("provx: {}", outcome.message);
        for line in &outcome.lines {
            eprintln!("{line}");
        }
    }
    Ok(outcome.status.code())
}

#[derive(Debug, Serialize)]
struct ProfileSummary<'a> {
    name: &'a str,
    uuid: &'a str,
    application_identifier: &'a str,
    distribution: String,
    platforms: Vec<&'static str>,
    creation_date: String,
    expiration_date: String,
    expired: bool,
    team_identifiers: &'a [String],
    certificates: Vec<CertificateSummary<'a>>,
}

#[derive(Debug, Serialize)]
struct CertificateSummary<'a> {
    name: &'a str,
    thumbprint: &'a str,
}

impl<'a> ProfileSummary<'a> {
    fn new(profile: &'a ProvisioningProfile, now: OffsetDateTime) -> Self {
        Self {
            name: &profile.name,
            uuid: &profile.uuid,
            application_identifier: profile.application_identifier().unwrap_or_default(),
            distribution: profile.distribution_type().to_canonical(),
            platforms: profile.platforms.iter().map(|p| p.as_str()).collect(),
            creation_date: format_date(profile.creation_date),
            expiration_date: format_date(profile.expiration_date),
            expired: profile.is_expired(now),
            team_identifiers: &profile.team_identifier_prefix,
            certificates: profile
                .developer_certificates
                .iter()
                .map(|cert| CertificateSummary {
                    name: &cert.common_name,
                    thumbprint: &cert.thumbprint,
                })
                .collect(),
        }
    }

    fn line(&self) -> String {
        format!(
            "{}  {}  {}  {}  expires {}{}",
            self.name,
            self.uuid,
            self.application_identifier,
            self.distribution,
            self.expiration_date,
            if self.expired { " (expired)" } else { "" }
        )
    }
}

fn format_date(value: OffsetDateTime) -> String {
    value
        .format(&Rfc3339)
        .unwrap_or_else(|_| value.to_string())
}

fn rejection_lines(rejections: &[Rejection]) -> Vec<String> {
    if rejections.is_empty() {
        return Vec::new();
    }
    let mut lines = vec![String::new(), "Not applicable:".to_string()];
    lines.extend(rejections.iter().map(|rejection| format!("  - {rejection}")));
    lines
}

fn rejection_details(rejections: &[Rejection]) -> Vec<Value> {
    rejections
        .iter()
        .map(|rejection| {
            json!({
                "profile": rejection.profile,
                "file": rejection.file_name.as_str(),
                "reason": rejection.to_string(),
            })
        })
        .collect()
}

pub fn profile_list(
    platform: Platform,
    profiles: &[ProvisioningProfile],
    rejections: &[Rejection],
) -> Outcome {
    let now = OffsetDateTime::now_utc();
    let summaries: Vec<_> = profiles
        .iter()
        .map(|profile| ProfileSummary::new(profile, now))
        .collect();
    let message = match summaries.len() {
        1 => format!("1 {platform} profile"),
        n => format!("{n} {platform} profiles"),
    };
    let mut lines: Vec<String> = summaries.iter().map(ProfileSummary::line).collect();
    lines.extend(rejection_lines(rejections));
    Outcome {
        status: CommandStatus::Ok,
        message,
        details: json!({
            "platform": platform.as_str(),
            "profiles": summaries,
            "rejections": rejection_details(rejections),
        }),
        lines,
    }
}

pub fn profile_detail(profile: &ProvisioningProfile) -> Outcome {
    let summary = ProfileSummary::new(profile, OffsetDateTime::now_utc());
    let mut lines = vec![
        format!("uuid:          {}", summary.uuid),
        format!("app id:        {}", summary.application_identifier),
        format!("distribution:  {}", summary.distribution),
        format!("platforms:     {}", summary.platforms.join(", ")),
        format!("created:       {}", summary.creation_date),
        format!("expires:       {}", summary.expiration_date),
    ];
    for cert in &summary.certificates {
        lines.push(format!("certificate:   {} ({})", cert.name, cert.thumbprint));
    }
    Outcome {
        status: CommandStatus::Ok,
        message: summary.name.to_string(),
        details: json!({ "profile": summary }),
        lines,
    }
}

pub fn not_found(platform: Platform, name_or_uuid: &str, rejections: &[Rejection]) -> Outcome {
    Outcome {
        status: CommandStatus::UserError,
        message: format!("no {platform} profile is named or has the UUID '{name_or_uuid}'"),
        details: json!({
            "platform": platform.as_str(),
            "query": name_or_uuid,
            "rejections": rejection_details(rejections),
        }),
        lines: rejection_lines(rejections),
    }
}

pub fn index_report(status: CommandStatus, config: &Config, reconciled: &Reconciled) -> Outcome {
    let report = &reconciled.report;
    let index = config.index();
    let save = match report.save {
        None => "unchanged",
        Some(SaveOutcome::Saved) => "saved",
        Some(SaveOutcome::Failed) => "failed",
    };
    let message = match report.kind {
        ReconcileKind::Fresh => {
            format!("index is up to date ({} profiles)", reconciled.index.len())
        }
        ReconcileKind::Rebuilt => format!("index rebuilt ({} profiles)", reconciled.index.len()),
        ReconcileKind::Synced => format!("index synced ({} profiles)", reconciled.index.len()),
    };

    let mut lines = vec![format!(
        "index:      {} (from {})",
        index.path.display(),
        index.source
    )];
    for dir in config.profile_directories() {
        lines.push(format!(
            "profiles:   {} (from {})",
            dir.path.display(),
            dir.source
        ));
    }
    if report.kind != ReconcileKind::Fresh {
        lines.push(format!(
            "parsed {}, added {}, replaced {}, removed {}, failed {}; save {save}",
            report.parsed, report.added, report.replaced, report.removed, report.failed
        ));
    }

    Outcome {
        status,
        message,
        details: json!({
            "index": {
                "path": index.path.display().to_string(),
                "source": index.source,
                "version": reconciled.index.version(),
                "records": reconciled.index.len(),
            },
            "directories": config
                .profile_directories()
                .iter()
                .map(|dir| json!({
                    "path": dir.path.display().to_string(),
                    "source": dir.source,
                }))
                .collect::<Vec<_>>(),
            "reconcile": {
                "kind": report.kind.as_str(),
                "parsed": report.parsed,
                "added": report.added,
                "replaced": report.replaced,
                "removed": report.removed,
                "failed": report.failed,
                "save": save,
            },
        }),
        lines,
    }
}
