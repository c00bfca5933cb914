use serde_json::json;
use sysinfo::ProcessesToUpdate;

pub fn collect(active_sessions: usize) -> serde_json::Value {
  let pid = sysinfo::Pid::from(std::process::id() as usize);
  let mut system = sysinfo::System::new();
  let processes = [pid];
  system.refresh_processes(ProcessesToUpdate::Some(&processes), false);
  let mut diagnostics = json!({
    "pid": std::process::id(),
    "active_sessions": active_sessions,
  });
  if let Some(proc) = system.process(pid) {
    diagnostics["memory_bytes"] = json!(proc.memory());
    diagnostics["virtual_memory_bytes"] = json!(proc.virtual_memory());
    diagnostics["cpu_usage"] = json!(proc.cpu_usage());
    diagnostics["start_time"] = json!(proc.start_time());
    diagnostics["memory_mb"] = json!(proc.memory() as f64 / (1024.0 * 1024.0));
  }
  diagnostics
}
