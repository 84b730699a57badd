//! 两台设备共享一个进程内远端：离线加书架、恢复网络后同步、阅读会话保存进度

use std::sync::Arc;
use std::time::Duration;

use inkshelf_sdk::{
    Bookmark, ChapterContext, InMemoryRemoteStore, InkshelfConfig, InkshelfSDK, Result,
};

async fn device(name: &str, remote: Arc<InMemoryRemoteStore>) -> Result<Arc<InkshelfSDK>> {
    let data_dir = std::env::temp_dir().join(format!("inkshelf-demo-{}", name));
    let config = InkshelfConfig::builder()
        .data_dir(&data_dir)
        .remote_timeout(5)
        .build();
    InkshelfSDK::initialize_with_remote(config, remote).await
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("\n🚀 离线同步演示\n");

    let remote = Arc::new(InMemoryRemoteStore::new());
    let phone = device("phone", remote.clone()).await?;
    let tablet = device("tablet", remote.clone()).await?;
    phone.login("reader-1").await?;
    tablet.login("reader-1").await?;

    // 1. 手机离线加入书架，本地立即可见
    remote.set_offline(true);
    let outcome = phone
        .add_bookmark(Bookmark::new("blue-period", "Blue Period", 0))
        .await?;
    println!("离线加书架: committed={}", outcome.is_committed());
    println!("手机书架: {} 本", phone.bookmarks().await?.len());

    // 2. 恢复网络后同步，平板拉取到同一份书架
    remote.set_offline(false);
    let result = phone.full_sync().await?;
    println!("手机同步: success={}, errors={:?}", result.is_success(), result.errors());
    tablet.full_sync().await?;
    println!("平板书架: {:?}", tablet.bookmarks().await?);

    // 3. 平板阅读第 5 话，滚动静止后保存进度
    let session = tablet
        .open_chapter(ChapterContext {
            title_id: "blue-period".into(),
            chapter_id: "5".into(),
            chapter_title: Some("Chapter 5".into()),
            display_title: Some("Blue Period".into()),
            ..Default::default()
        })
        .await?;
    for percent in [12, 35, 58, 95] {
        session.report_percent(percent);
        tokio::time::sleep(Duration::from_millis(1_200)).await;
    }
    session.close().await?;

    phone.full_sync().await?;
    if let Some(progress) = phone.get_progress("blue-period").await? {
        println!(
            "手机看到的进度: 最后阅读 {}，已读章节 {:?}",
            progress.last_chapter_title, progress.chapters_read
        );
    }

    phone.shutdown().await?;
    tablet.shutdown().await?;
    println!("\n✅ 演示完成");
    Ok(())
}
