// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sophy login` and `sophy register`.

use sophy_session::auth::Registration;
use sophy_session::SessionClient;

use crate::cli::{LoginArgs, RegisterArgs};

pub async fn login(client: &SessionClient, args: &LoginArgs) -> anyhow::Result<i32> {
    let user = client.auth().login(&args.phone, &args.password).await?;
    match user.fullname {
        Some(name) => println!("logged in as {name} ({})", user.user_id),
        None => println!("logged in as {}", user.user_id),
    }
    Ok(0)
}

pub async fn register(client: &SessionClient, args: &RegisterArgs) -> anyhow::Result<i32> {
    let registration = Registration {
        phone: args.phone.clone(),
        password: args.password.clone(),
        fullname: args.fullname.clone(),
        is_male: args.male,
        birthday: args.birthday.clone(),
    };
    let user = client.auth().register(&registration).await?;
    println!("registered and logged in as {}", user.user_id);
    Ok(0)
}
