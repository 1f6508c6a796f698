use std::collections::HashSet;

use kiln::stager::Stager;

#[tokio::test]
async fn concurrent_stages_never_share_a_location() {
    let root = tempfile::tempdir().unwrap();
    let stager = Stager::new(root.path(), "main.rs");

    let sources: Vec<String> = (0..64).map(|i| format!("fn main() {{ {i}; }}")).collect();
    let staged = futures::future::join_all(sources.iter().map(|s| stager.stage(s))).await;
    let artifacts: Vec<_> = staged.into_iter().map(Result::unwrap).collect();

    let dirs: HashSet<_> = artifacts.iter().map(|a| a.dir().to_path_buf()).collect();
    assert_eq!(dirs.len(), sources.len());

    for (source, artifact) in sources.iter().zip(&artifacts) {
        assert_eq!(&std::fs::read_to_string(artifact.source_path()).unwrap(), source);
    }

    for artifact in artifacts {
        stager.release(artifact).await;
    }
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn custom_source_name_is_used() {
    let root = tempfile::tempdir().unwrap();
    let stager = Stager::new(root.path(), "input.sl");

    let artifact = stager.stage("x").await.unwrap();
    assert_eq!(artifact.source_path().file_name().unwrap(), "input.sl");
    stager.release(artifact).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn stage_and_release_from_many_tasks() {
    let root = tempfile::tempdir().unwrap();
    let stager = std::sync::Arc::new(Stager::new(root.path(), "main.rs"));

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let stager = std::sync::Arc::clone(&stager);
            tokio::spawn(async move {
                let artifact = stager.stage(&i.to_string()).await.unwrap();
                assert_eq!(
                    std::fs::read_to_string(artifact.source_path()).unwrap(),
                    i.to_string()
                );
                stager.release(artifact).await;
            })
        })
        .collect();
    for task in futures::future::join_all(tasks).await {
        task.unwrap();
    }

    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}
