use crate::app::{AppContext, KeepsakeError, Result};
use crate::controller::FavoriteList;
use crate::domain::{PropertyId, RecordId, ToggleOutcome, UserId};
use crate::notify::{NoticeKind, SIGN_IN_REQUIRED};

/// The configured user, or a sign-in prompt.
fn signed_in(ctx: &AppContext) -> Option<&UserId> {
    if ctx.user.is_none() {
        ctx.services.notifier.notify(NoticeKind::Error, SIGN_IN_REQUIRED);
    }
    ctx.user.as_ref()
}

pub async fn show_status(ctx: &AppContext, property: &str) -> Result<()> {
    let Some(user) = signed_in(ctx) else {
        return Ok(());
    };

    let toggle = ctx.favorite_toggle(PropertyId::from(property));
    let status = toggle.check_status(Some(user)).await?;
    toggle.dispose();

    match status.record_id {
        Some(id) if status.is_favorite => println!("{} is a favorite ({})", property, id),
        _ if status.is_favorite => println!("{} is a favorite", property),
        _ => println!("{} is not a favorite", property),
    }
    Ok(())
}

pub async fn toggle_favorite(ctx: &AppContext, property: &str) -> Result<()> {
    let toggle = ctx.favorite_toggle(PropertyId::from(property));
    if let Some(user) = &ctx.user {
        toggle.check_status(Some(user)).await?;
    }

    let result = toggle.toggle(ctx.user.as_ref()).await;
    toggle.dispose();

    match result {
        Ok(ToggleOutcome::Added(id)) => println!("Saved {} as {}", property, id),
        Ok(ToggleOutcome::Removed) => println!("Removed {}", property),
        Ok(ToggleOutcome::AlreadyFavorite(_)) | Ok(ToggleOutcome::Ignored) => {}
        // The notifier already prompted for sign-in.
        Err(KeepsakeError::Unauthenticated) => {}
        Err(e) => return Err(e),
    }
    Ok(())
}

pub async fn list_favorites(ctx: &AppContext) -> Result<()> {
    let Some(user) = signed_in(ctx) else {
        return Ok(());
    };

    let records = ctx.store.list(user).await?;
    if records.is_empty() {
        println!("No favorites");
        return Ok(());
    }

    for record in records {
        let saved = record
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{}  {}  {}", saved, record.property_id, record.id);
    }
    Ok(())
}

pub async fn remove_favorite(ctx: &AppContext, record_id: &str) -> Result<()> {
    let Some(user) = signed_in(ctx) else {
        return Ok(());
    };

    ctx.store
        .delete_by_id(user, &RecordId::from(record_id))
        .await?;
    println!("Removed favorite: {}", record_id);
    Ok(())
}

pub async fn watch_favorites(ctx: &AppContext) -> Result<()> {
    let Some(user) = signed_in(ctx) else {
        return Ok(());
    };

    let list = ctx.favorite_list();
    let mut changes = list.changes();
    list.start(Some(user.clone())).await?;
    changes.borrow_and_update();
    print_favorites(&list);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                print_favorites(&list);
            }
            _ = &mut ctrl_c => break,
        }
    }

    list.dispose();
    Ok(())
}

fn print_favorites(list: &FavoriteList) {
    let ids = list.favorite_ids();
    println!("{} favorites", ids.len());
    for id in ids.sorted() {
        println!("  {}", id);
    }
}
