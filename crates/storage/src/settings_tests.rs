// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::Store;

#[tokio::test]
async fn set_get_and_overwrite() {
    let store = Store::open_in_memory().await.unwrap();
    assert_eq!(store.get_setting("hooks_dir").await.unwrap(), None);

    store.set_setting("hooks_dir", "/etc/tq/hooks").await.unwrap();
    assert_eq!(
        store.get_setting("hooks_dir").await.unwrap().as_deref(),
        Some("/etc/tq/hooks")
    );

    store.set_setting("hooks_dir", "/other").await.unwrap();
    assert_eq!(
        store.get_setting("hooks_dir").await.unwrap().as_deref(),
        Some("/other")
    );
}

#[tokio::test]
async fn setting_or_parses_with_fallback() {
    let store = Store::open_in_memory().await.unwrap();
    store.set_setting("port_range_min", "4000").await.unwrap();
    store.set_setting("bad_number", "not-a-port").await.unwrap();

    assert_eq!(store.setting_or("port_range_min", 3100u16).await.unwrap(), 4000);
    assert_eq!(store.setting_or("missing", 3100u16).await.unwrap(), 3100);
    assert_eq!(store.setting_or("bad_number", 7u16).await.unwrap(), 7);
}
