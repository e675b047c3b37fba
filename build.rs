use vergen::EmitBuilder;

fn main() {
    // 生成构建信息，供 `protoprobe --version` 的长输出使用
    EmitBuilder::builder()
        .build_date()
        .git_sha(true)
        .emit()
        .expect("无法生成构建信息");
}
