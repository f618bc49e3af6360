//! Application bootstrap script.
//!
//! Writes the application's environment file, fixes ownership of the
//! deployed files and starts the CloudWatch agent. Database and topic lines
//! are present only when those tiers are.
//!
//! Every placeholder sits inside single quotes. Configured values are
//! escaped for that context; resolved attributes (addresses, ARNs) are
//! inserted as is.

use forge_core::{Binding, BootstrapPayload, DeferredValue};

use crate::config::TopologySettings;
use crate::error::IacResult;

const CLOUDWATCH_AGENT_CTL: &str = "/opt/aws/amazon-cloudwatch-agent/bin/amazon-cloudwatch-agent-ctl";

/// Values that exist only after other resources are created.
#[derive(Debug, Clone, Default)]
pub struct BootstrapInputs {
    /// Database instance `address`.
    pub database_host: Option<DeferredValue>,
    /// Topic `arn`.
    pub topic_arn: Option<DeferredValue>,
}

/// Escape `value` for use between single quotes: `'` becomes `'\''`.
fn single_quoted(value: &str) -> String {
    value.replace('\'', "'\\''")
}

fn template(include_database: bool, include_topic: bool) -> String {
    let mut env_lines: Vec<&str> = Vec::new();
    if include_database {
        env_lines.extend([
            "DB_HOST=${DB_HOST}",
            "DB_PORT=${DB_PORT}",
            "DB_USER=${DB_USER}",
            "DB_PASSWORD=${DB_PASSWORD}",
            "DB_NAME=${DB_NAME}",
        ]);
    }
    env_lines.extend([
        "PORT=${PORT}",
        "FILE_PATH=${FILE_PATH}",
        "LOG_FILE_PATH=${LOG_FILE_PATH}",
    ]);
    if include_topic {
        env_lines.push("SUBMISSION_TOPIC_ARN=${SUBMISSION_TOPIC_ARN}");
    }
    env_lines.push("AWS_REGION=${AWS_REGION}");

    let mut script = String::from("#!/bin/bash\n{\n");
    for line in env_lines {
        script.push_str(&format!("\techo '{}'\n", line));
    }
    script.push_str("} >> '${PROPERTY_FILE}'\n");
    for file in ["${PROPERTY_FILE}", "${BINARY_FILE}", "${RESOURCE_FILE}"] {
        script.push_str(&format!("sudo chown '${{APP_USER}}:${{APP_GROUP}}' '{}'\n", file));
    }
    script.push_str("sudo chmod 640 '${PROPERTY_FILE}'\n");
    script.push_str(&format!(
        "{{\n\tsudo {} \\\n\t\t-a fetch-config \\\n\t\t-m ec2 \\\n\t\t-c 'file:${{CLOUDWATCH_CONFIG_FILE}}' \\\n\t\t-s\n}}\n",
        CLOUDWATCH_AGENT_CTL
    ));
    script
}

/// Build the bootstrap payload with every placeholder bound.
pub fn application_payload(
    settings: &TopologySettings,
    inputs: BootstrapInputs,
) -> IacResult<BootstrapPayload> {
    let app = &settings.application;
    let database = match (&settings.database, inputs.database_host) {
        (Some(db), Some(host)) => Some((db, host)),
        _ => None,
    };

    let mut payload = BootstrapPayload::new(
        "application-user-data",
        template(database.is_some(), inputs.topic_arn.is_some()),
    );

    if let Some((db, host)) = database {
        payload = payload
            .bind("DB_HOST", host)?
            .bind("DB_PORT", db.port.to_string())?
            .bind("DB_USER", single_quoted(&db.master_user))?
            .bind("DB_PASSWORD", Binding::Secret(single_quoted(&db.master_password)))?
            .bind("DB_NAME", single_quoted(&db.name))?;
    }
    if let Some(topic_arn) = inputs.topic_arn {
        payload = payload.bind("SUBMISSION_TOPIC_ARN", topic_arn)?;
    }

    let payload = payload
        .bind("PORT", app.port.to_string())?
        .bind("FILE_PATH", single_quoted(&app.resource_file))?
        .bind("LOG_FILE_PATH", single_quoted(&app.log_file))?
        .bind("AWS_REGION", single_quoted(&settings.region))?
        .bind("PROPERTY_FILE", single_quoted(&app.property_file))?
        .bind("BINARY_FILE", single_quoted(&app.binary_file))?
        .bind("RESOURCE_FILE", single_quoted(&app.resource_file))?
        .bind("APP_USER", single_quoted(&app.user))?
        .bind("APP_GROUP", single_quoted(&app.user_group))?
        .bind("CLOUDWATCH_CONFIG_FILE", single_quoted(&app.cloudwatch_config_file))?;

    payload.validate()?;
    Ok(payload)
}
