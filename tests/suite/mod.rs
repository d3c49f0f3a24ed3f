mod exports;
mod host_loop;
mod native;
