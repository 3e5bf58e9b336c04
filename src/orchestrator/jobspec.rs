//! Pure mutation of a `Job` to point one repository's task(s) at a new
//! image tag, plus the deliberate `meta.restart` toggle workaround.

use super::Job;

const UI_TASK_IMAGE_NAME: &str = "registrywatcher-ui";

/// Rewrites every task whose image basename is `repo` to
/// `domain/prefix/repo:tag`, sets `force_pull`, performs the bootstrap
/// co-upgrade of `registrywatcher-ui` when `repo` is the registrywatcher
/// itself, and flips `meta.restart` to force the orchestrator to treat the
/// submission as a change.
///
/// Idempotent on the image field: calling this twice with the same `tag`
/// produces identical `config.image` values, though `meta.restart` flips
/// again each call by design.
pub fn apply_tag_update(
    job: &mut Job,
    repo: &str,
    domain: &str,
    prefix: &str,
    tag: &str,
    vault_token: Option<&str>,
) {
    let desired_image = format!("{domain}/{prefix}/{repo}:{tag}");
    let ui_image = format!("{domain}/{prefix}/{UI_TASK_IMAGE_NAME}:{tag}");

    for group in &mut job.task_groups {
        for task in &mut group.tasks {
            let basename = image_basename(&task.config.image);
            if basename == repo {
                task.config.image = desired_image.clone();
                task.config.force_pull = true;
            } else if basename == UI_TASK_IMAGE_NAME {
                task.config.image = ui_image.clone();
                task.config.force_pull = true;
            }
        }
    }

    job.vault_token = vault_token.map(str::to_string);
    flip_restart_meta(job);
}

fn image_basename(image: &str) -> &str {
    let without_tag = image.split(':').next().unwrap_or(image);
    without_tag.rsplit('/').next().unwrap_or(without_tag)
}

fn flip_restart_meta(job: &mut Job) {
    let next = match job.meta.get("restart").map(String::as_str) {
        Some("foo") => "bar",
        Some("bar") => "foo",
        _ => "bar",
    };
    job.meta.insert("restart".to_string(), next.to_string());
}
