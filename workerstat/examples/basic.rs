use std::time::Duration;

use workerstat::{Config, Measurement, Stat};

async fn pull_image(name: &str) -> Result<u64, std::io::Error> {
    tokio::time::sleep(Duration::from_millis(120)).await;
    Ok(name.len() as u64 * 1024 * 1024)
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    // Without `influx.connectionString`, points are only logged.
    let config: Config = serde_json::from_str(
        r#"{
            "workerId": "i-0abc",
            "workerType": "ci",
            "workerGroup": "us-east-1",
            "workerNodeType": "m5.large",
            "provisionerId": "aws",
            "capacity": 2
        }"#,
    )
    .expect("invalid configuration");

    let stat = Stat::new(&config).expect("failed to build stats");

    stat.increment("workerStart");
    stat.record("capacityAvailable", 2);

    let start = stat.now();
    stat.increment("taskClaim");
    stat.time("taskStart", start);

    let size = stat
        .time_future("imageDownload", pull_image("ubuntu:24.04"), [("image", "ubuntu:24.04")])
        .await
        .expect("failed to pull image");
    stat.record("imageLoad", [("duration", 35), ("size", size as i64)]);

    stat.record("taskResolved", Measurement::scalar(1).with_field("state", "completed"));
    stat.record("workerShutdown", Measurement::scalar(1).with_field("reason", "idle"));

    stat.close();
}
