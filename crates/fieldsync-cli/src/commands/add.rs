use std::path::Path;

use fieldsync_core::models::{Gender, RegistrationFields};
use fieldsync_core::util::normalize_text_option;

use crate::cli::AddArgs;
use crate::commands::common::open_store;
use crate::error::CliError;

pub fn fields_from_args(args: AddArgs) -> RegistrationFields {
    RegistrationFields {
        first_name: args.first_name.trim().to_string(),
        last_name: args.last_name.trim().to_string(),
        kind: args.kind.into(),
        gender: Gender::normalize(&args.gender),
        age: Some(args.age),
        contact: normalize_text_option(args.contact),
        place: normalize_text_option(args.place),
        education: normalize_text_option(args.education),
        marital_status: normalize_text_option(args.marital_status),
        facilitator_uuid: normalize_text_option(args.facilitator),
        source: Some("cli".to_string()),
        ..RegistrationFields::default()
    }
}

pub async fn run_add(args: AddArgs, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let registration = store.create(fields_from_args(args)).await?;

    println!("{}", registration.uuid);
    Ok(())
}
